// ABOUTME: Portable RAxML-NG bundle: shell script plus tar.gz archive
// ABOUTME: Lets the expensive inference steps run on a bigger machine

use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::info;

use crate::cli::config::RaxmlConfig;
use crate::pipeline::{PipelineError, Result, RunPaths};

/// Write raxml_run.sh next to the run artifacts and bundle it with
/// msa.fasta (and optionally a raxml-ng binary) into a tar.gz.
pub fn export_bundle(
    paths: &RunPaths,
    raxml: &RaxmlConfig,
    seed: u64,
    binary: Option<&Path>,
) -> Result<PathBuf> {
    let msa = paths.msa();
    if !msa.is_file() {
        return Err(PipelineError::MissingInput(format!(
            "{} (run the pipeline first)",
            msa.display()
        )));
    }

    let script_path = paths.export_script();
    let script = render_script(raxml, seed, binary.is_some());
    std::fs::write(&script_path, script)?;
    let mut perms = std::fs::metadata(&script_path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script_path, perms)?;
    info!("portable script written to {}", script_path.display());

    let archive_path = paths.export_archive();
    let archive = File::create(&archive_path)?;
    let encoder = GzEncoder::new(archive, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    builder.append_path_with_name(&msa, "msa.fasta")?;
    builder.append_path_with_name(&script_path, "raxml_run.sh")?;
    if let Some(binary) = binary {
        builder.append_path_with_name(binary, "raxml-ng")?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(archive_path)
}

/// The script mirrors the pipeline's four raxml-ng calls with relative
/// paths, capping threads at the machine's CPU count or a -f limit.
fn render_script(raxml: &RaxmlConfig, seed: u64, bundled_binary: bool) -> String {
    let binary = if bundled_binary {
        "./raxml-ng"
    } else {
        "raxml-ng"
    };
    let mut start_trees = Vec::new();
    if raxml.start_trees.rand > 0 {
        start_trees.push(format!("rand{{{}}}", raxml.start_trees.rand));
    }
    if raxml.start_trees.pars > 0 {
        start_trees.push(format!("pars{{{}}}", raxml.start_trees.pars));
    }
    let start_trees = start_trees.join(",");

    let mut script = String::from(
        "#!/bin/bash\n\
         # Execute via: bash raxml_run.sh [-f <thread limit>]\n\n\
         set -e\n\n\
         cpus=$(nproc)\n\
         cpu_limit=400\n\
         while getopts 'f:' flag; do\n\
         \tcase \"${flag}\" in\n\
         \t\tf) cpu_limit=\"${OPTARG}\" ;;\n\
         \t\t*) echo \"usage: bash raxml_run.sh [-f <thread limit>]\"; exit 1 ;;\n\
         \tesac\n\
         done\n\n\
         used=$cpus\n\
         if [ \"$cpu_limit\" -lt \"$cpus\" ]; then\n\
         \tused=$cpu_limit\n\
         fi\n\
         echo \"$cpus CPUs available, using at most $used\"\n\n",
    );
    if bundled_binary {
        script.push_str("chmod +x raxml-ng\n\n");
    }

    script.push_str(&format!(
        "# Check MSA\n\
         {bin} --check --msa msa.fasta --model {model} --prefix chk\n\n\
         # Find best ML tree\n\
         {bin} --msa msa.fasta --model {model} --prefix ml --seed {seed} \
         --threads auto{{$used}} --workers auto{{$used}} --redo --tree {trees}\n\n\
         # Compute bootstrap iterations\n\
         {bin} --bootstrap --msa msa.fasta --model ml.raxml.bestModel \
         --tree ml.raxml.bestTree --prefix bs --bs-trees {bootstrap} --seed {seed} \
         --threads auto{{$used}} --workers auto{{$used}} --redo\n\n\
         # Calculate branch support\n\
         {bin} --support --tree ml.raxml.bestTree --bs-trees bs.raxml.bootstraps \
         --bs-metric fbp,tbe --prefix sp --threads auto{{$used}} --workers auto{{$used}} --redo\n\n\
         # Copy tree files\n\
         cp sp.raxml.supportTBE tree_TBE.nwk\n\
         cp sp.raxml.supportFBP tree_FBP.nwk\n",
        bin = binary,
        model = raxml.model,
        seed = seed,
        trees = start_trees,
        bootstrap = raxml.bootstrap,
    ));
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Config;
    use flate2::read::GzDecoder;
    use tar::Archive;
    use tempfile::TempDir;

    #[test]
    fn test_script_contains_all_four_calls() {
        let script = render_script(&RaxmlConfig::default(), 42, false);
        assert!(script.contains("--check --msa msa.fasta"));
        assert!(script.contains("--tree rand{10},pars{10}"));
        assert!(script.contains("--seed 42"));
        assert!(script.contains("--bootstrap --msa msa.fasta"));
        assert!(script.contains("--bs-metric fbp,tbe"));
        assert!(script.contains("cp sp.raxml.supportTBE tree_TBE.nwk"));
        assert!(!script.contains("./raxml-ng"));
    }

    #[test]
    fn test_bundled_binary_uses_relative_path() {
        let script = render_script(&RaxmlConfig::default(), 7, true);
        assert!(script.contains("./raxml-ng --check"));
        assert!(script.contains("chmod +x raxml-ng"));
    }

    #[test]
    fn test_export_bundle_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.output_dir = dir.path().to_path_buf();
        let paths = RunPaths::new(&config.output_dir);
        std::fs::write(paths.msa(), ">s1\nACGT\n").unwrap();

        let archive_path = export_bundle(&paths, &config.raxml, 42, None).unwrap();
        assert!(archive_path.is_file());

        let mut names = Vec::new();
        let mut archive = Archive::new(GzDecoder::new(File::open(&archive_path).unwrap()));
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            names.push(entry.path().unwrap().display().to_string());
        }
        names.sort();
        assert_eq!(names, vec!["msa.fasta".to_string(), "raxml_run.sh".to_string()]);
    }

    #[test]
    fn test_export_requires_msa() {
        let dir = TempDir::new().unwrap();
        let paths = RunPaths::new(dir.path());
        assert!(matches!(
            export_bundle(&paths, &RaxmlConfig::default(), 1, None),
            Err(PipelineError::MissingInput(_))
        ));
    }
}
