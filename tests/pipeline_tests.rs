// ABOUTME: End-to-end pipeline tests with fake external tools
// ABOUTME: Runs trace discovery through tree inference against stub binaries

mod common;

use common::{write_fake_tool, TestEnvironment};
use treeline::pipeline::{PipelineRunner, PipelineStatus, RunContext, StageStatus};

/// Stub aligner: mafft-style, alignment written to stdout.
const FAKE_MAFFT: &str = r#"for arg; do last="$arg"; done
cat "$last""#;

/// Stub Gblocks: copies the input and exits non-zero like the real one.
const FAKE_GBLOCKS: &str = r#"cp "$1" "$1.txt"
exit 1"#;

/// Stub raxml-ng: emits progress motifs and fabricates the output
/// files each step is expected to leave behind.
const FAKE_RAXML: &str = r#"prefix=""
mode="ml"
while [ $# -gt 0 ]; do
  case "$1" in
    --prefix) prefix="$2"; shift ;;
    --check) mode="check" ;;
    --bootstrap) mode="bs" ;;
    --support) mode="sp" ;;
  esac
  shift
done
TREE='((D15_A01:0.1,D15_B02:0.2)95:0.02,D15_C03:0.3);'
case "$mode" in
  ml)
    echo "[00:00:01] ML tree search #1, logLikelihood: -1000.0"
    echo "$TREE" > "${prefix}.raxml.bestTree"
    echo "GTR+G" > "${prefix}.raxml.bestModel"
    ;;
  bs)
    echo "[00:00:02] Bootstrap tree #1, logLikelihood: -1001.0"
    echo "$TREE" > "${prefix}.raxml.bootstraps"
    ;;
  sp)
    echo "$TREE" > "${prefix}.raxml.supportFBP"
    echo "$TREE" > "${prefix}.raxml.supportTBE"
    ;;
esac
echo "Elapsed time: 0.1 seconds"
exit 0"#;

fn seed_traces(env: &TestEnvironment) {
    // three samples, clean phred 40 traces, equal lengths
    for well in ["A01", "B02", "C03"] {
        env.write_trace(
            &format!("D15_ITS_{}.ab1", well),
            b"ACGTACGTACGTACGTACGT",
            &[40u8; 20],
        );
    }
}

fn tooled_config(env: &TestEnvironment) -> treeline::cli::Config {
    let bin_dir = env.dir.path().join("bin");
    std::fs::create_dir_all(&bin_dir).unwrap();

    let mut config = env.config(&["ITS"]);
    config.msa.binary = Some(write_fake_tool(&bin_dir, "mafft", FAKE_MAFFT));
    config.gblocks.binary = Some(write_fake_tool(&bin_dir, "Gblocks", FAKE_GBLOCKS));
    config.raxml.binary = Some(write_fake_tool(&bin_dir, "raxml-ng", FAKE_RAXML));
    config
}

#[tokio::test]
async fn test_full_pipeline_against_stub_tools() {
    let env = TestEnvironment::new();
    seed_traces(&env);
    let ctx = RunContext::new(tooled_config(&env)).unwrap();

    let result = PipelineRunner::standard().execute(&ctx).await;

    assert_eq!(result.status, PipelineStatus::Success, "{:?}", result);
    assert_eq!(result.get_stage("blast").unwrap().status, StageStatus::Skipped);
    for stage in ["trim", "align", "gblocks", "concat", "raxml"] {
        assert_eq!(
            result.get_stage(stage).unwrap().status,
            StageStatus::Success,
            "stage {}",
            stage
        );
    }

    // artifacts of every stage are on disk
    assert!(ctx.paths.gene_fasta("ITS").is_file());
    assert!(ctx.paths.raw_msa("ITS").is_file());
    assert!(ctx.paths.trimmed_msa("ITS").is_file());
    assert!(ctx.paths.msa().is_file());
    assert!(ctx.paths.metadata().is_file());
    assert!(ctx.paths.bad_seqs().is_file());
    assert!(ctx.paths.tree_file("TBE").is_file());
    assert!(ctx.paths.tree_file("FBP").is_file());

    let raxml = result.get_stage("raxml").unwrap();
    assert_eq!(raxml.metadata.get("ml_trees"), Some(&"1".to_string()));
    assert_eq!(raxml.metadata.get("seed"), Some(&"7".to_string()));
}

#[tokio::test]
async fn test_pipeline_report_renders_after_run() {
    let env = TestEnvironment::new();
    seed_traces(&env);
    let ctx = RunContext::new(tooled_config(&env)).unwrap();

    let result = PipelineRunner::standard().execute(&ctx).await;
    treeline::output::write_result_json(&ctx.paths.result_json(), &result).unwrap();
    treeline::report::build_report(&ctx.paths, &ctx.config)
        .await
        .unwrap();

    let html = std::fs::read_to_string(ctx.paths.report()).unwrap();
    assert!(html.contains("D15_A01"));
    assert!(html.contains("svg"));
    assert!(html.contains(&ctx.run_id));
}

#[tokio::test]
async fn test_missing_aligner_fails_align_stage() {
    let env = TestEnvironment::new();
    seed_traces(&env);

    let mut config = tooled_config(&env);
    // point at a missing binary and an algo that will not be on PATH
    config.msa.algo = treeline::cli::MsaAlgo::TCoffee;
    config.msa.binary = Some(env.dir.path().join("bin/definitely-missing"));
    config.remote.enabled = false;
    let ctx = RunContext::new(config).unwrap();

    let result = PipelineRunner::standard().execute(&ctx).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.get_stage("trim").unwrap().status, StageStatus::Success);
    assert_eq!(result.get_stage("align").unwrap().status, StageStatus::Failed);
    // everything after the failure is skipped, and the run says so
    assert_eq!(result.get_stage("raxml").unwrap().status, StageStatus::Skipped);
    assert_eq!(
        result.get_stage("raxml").unwrap().error.as_deref(),
        Some("earlier stage failed")
    );
}

#[tokio::test]
async fn test_hopeless_traces_are_rejected_with_reasons() {
    let env = TestEnvironment::new();
    // one good trace, one all-noise trace
    env.write_trace("D15_ITS_A01.ab1", b"ACGTACGTACGTACGTACGT", &[40u8; 20]);
    env.write_trace("D15_ITS_B02.ab1", b"ACGTACGTACGTACGTACGT", &[5u8; 20]);

    let ctx = RunContext::new(tooled_config(&env)).unwrap();
    let result = PipelineRunner::standard().execute(&ctx).await;

    assert_eq!(result.get_stage("trim").unwrap().status, StageStatus::Success);
    let bad = std::fs::read_to_string(ctx.paths.bad_seqs()).unwrap();
    assert!(bad.contains("D15_B02"));
    let metadata = std::fs::read_to_string(ctx.paths.metadata()).unwrap();
    assert!(metadata.contains("D15_A01"));
    assert!(!metadata.contains("D15_B02"));
}
