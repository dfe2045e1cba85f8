// ABOUTME: Integration tests for report generation from run artifacts
// ABOUTME: Renders report.html out of seeded result directories

use tempfile::TempDir;
use treeline::cli::Config;
use treeline::pipeline::{PipelineResult, RunPaths, StageResult, StageStatus};
use treeline::report;

fn seeded_run(dir: &TempDir) -> RunPaths {
    let paths = RunPaths::new(dir.path());
    std::fs::write(
        paths.tree_file("TBE"),
        "((iso_A1:0.11,iso_B2:0.08)96:0.02,(iso_C3:0.2,'iso D4':0.1)44:0.05);",
    )
    .unwrap();
    std::fs::write(
        paths.metadata(),
        "sample\tgene\tfile\twell\tdirection\treference\ttrimmed_length\taccession\tspecies\tpident\n\
         iso_A1\tITS\tD15_ITS_A01.ab1\tA01\tfwd\tno\t512\tMH855322.1\tFusarium oxysporum\t99.2\n\
         iso_B2\tITS\tD15_ITS_B02.ab1\tB02\trev\tno\t367\t-\t-\t-\n",
    )
    .unwrap();
    std::fs::write(
        paths.missing_samples(),
        "gene\tmissing samples\nITS\tNone\nOPA10\tiso_B2\n",
    )
    .unwrap();

    let mut result = PipelineResult::new("run_report_test", 3);
    for stage in ["trim", "align", "gblocks", "concat", "raxml"] {
        let mut stage_result = StageResult::new(stage);
        stage_result.mark_completed(StageStatus::Success, Some("ok".to_string()), None);
        result.add_stage_result(stage_result);
    }
    result.mark_completed();
    treeline::output::write_result_json(&paths.result_json(), &result).unwrap();
    paths
}

#[tokio::test]
async fn test_report_from_seeded_artifacts() {
    let dir = TempDir::new().unwrap();
    let paths = seeded_run(&dir);

    report::build_report(&paths, &Config::default()).await.unwrap();
    let html = std::fs::read_to_string(paths.report()).unwrap();

    // run facts
    assert!(html.contains("run_report_test"));
    assert!(html.contains("seed 3"));
    // the tree made it in, quoted label intact
    assert!(html.contains("iso D4"));
    assert!(html.contains("class=\"node strong\""));
    assert!(html.contains("class=\"node weak\""));
    // species annotation and the missing-samples section
    assert!(html.contains("Fusarium oxysporum"));
    assert!(html.contains("OPA10"));
    // stage table rows
    for stage in ["trim", "align", "gblocks", "concat", "raxml"] {
        assert!(html.contains(stage), "missing stage {}", stage);
    }
}

#[tokio::test]
async fn test_report_survives_missing_tables() {
    let dir = TempDir::new().unwrap();
    let paths = RunPaths::new(dir.path());
    std::fs::write(paths.tree_file("FBP"), "(a:0.1,b:0.2);").unwrap();

    // no metadata, no summary: the report still renders from the tree
    report::build_report(&paths, &Config::default()).await.unwrap();
    let html = std::fs::read_to_string(paths.report()).unwrap();
    assert!(html.contains("data-id=\"a\""));
    assert!(html.contains("FBP"));
}

#[tokio::test]
async fn test_visualize_command_rebuilds_report() {
    let dir = TempDir::new().unwrap();
    let paths = seeded_run(&dir);

    treeline::cli::commands::visualize(dir.path(), &Config::default())
        .await
        .unwrap();
    assert!(paths.report().is_file());
}

#[test]
fn test_locate_results_from_tree_file() {
    let dir = TempDir::new().unwrap();
    seeded_run(&dir);

    let found =
        treeline::cli::commands::locate_results(Some(dir.path()), &Config::default()).unwrap();
    assert_eq!(found, dir.path());
}
