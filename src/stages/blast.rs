// ABOUTME: BLAST species annotation stage for the first gene
// ABOUTME: Local blastn with tabular output, NCBI URL API fallback for misses

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::output::tables::{self, Annotation};
use crate::pipeline::{PipelineError, PipelineState, Result, RunContext};
use crate::tools::{find_binary, ToolCommand};
use crate::trace::{self, SeqRecord};

use super::{Stage, StageOutput};

const NCBI_BLAST_URL: &str = "https://blast.ncbi.nlm.nih.gov/Blast.cgi";
const OUTFMT: &str = "6 qseqid sacc pident length evalue bitscore sscinames";

pub struct BlastStage;

#[async_trait::async_trait]
impl Stage for BlastStage {
    fn name(&self) -> &'static str {
        "blast"
    }

    fn skip_reason(&self, ctx: &RunContext) -> Option<String> {
        if !ctx.config.blast.enabled {
            return Some("BLAST disabled".to_string());
        }
        None
    }

    async fn execute(&self, ctx: &RunContext, state: &mut PipelineState) -> Result<StageOutput> {
        let gene = state
            .registry()?
            .genes
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::MissingInput("annotation gene".to_string()))?;
        let query = ctx.paths.gene_fasta(&gene);
        if !query.is_file() {
            return Err(PipelineError::MissingInput(format!(
                "{} (produced by the trim stage)",
                query.display()
            )));
        }

        let mut annotations: HashMap<String, Annotation> = HashMap::new();
        let mut local_hits = 0usize;
        let mut remote_hits = 0usize;

        let local_db = self.prepare_local_db(ctx).await?;
        if let Some(ref db_path) = local_db {
            annotations = self.run_local(ctx, &query, db_path).await?;
            local_hits = annotations.len();
            info!("local BLAST annotated {} queries", local_hits);
        }

        // everything without a local hit goes to the URL API
        let queries = trace::read_fasta(&query)?;
        let missing: Vec<SeqRecord> = queries
            .iter()
            .filter(|record| !annotations.contains_key(&record.id))
            .cloned()
            .collect();

        if !missing.is_empty() {
            trace::write_fasta(&ctx.paths.missing_fasta(), &missing)?;
            if ctx.config.blast.remote {
                info!(
                    "{} sequences without local hits; querying NCBI BLAST",
                    missing.len()
                );
                match self.run_remote(ctx, &missing).await {
                    Ok(remote) => {
                        remote_hits = remote.len();
                        annotations.extend(remote);
                    }
                    Err(e) => warn!("remote BLAST failed, continuing unannotated: {}", e),
                }
            } else if local_db.is_none() {
                return Err(PipelineError::RemoteDisabled {
                    context: "species annotation without a local database".to_string(),
                });
            } else {
                info!(
                    "{} sequences without local hits; remote lookups disabled",
                    missing.len()
                );
            }
        }

        // rewrite the metadata table with annotations merged in
        tables::write_metadata(&ctx.paths.metadata(), &state.metadata, &annotations)?;

        let output = StageOutput::summary(format!(
            "{} of {} queries annotated ({} local, {} remote)",
            annotations.len(),
            queries.len(),
            local_hits,
            remote_hits
        ))
        .with_metadata("gene", gene)
        .with_metadata("annotated", annotations.len().to_string())
        .with_metadata("queries", queries.len().to_string());

        state.annotations = annotations;
        Ok(output)
    }
}

impl BlastStage {
    /// Make sure a usable local database exists, building it from a
    /// FASTA when so configured. Returns None when only remote lookups
    /// are possible.
    async fn prepare_local_db(&self, ctx: &RunContext) -> Result<Option<std::path::PathBuf>> {
        let blast = &ctx.config.blast;
        let db_path = match blast.db_path {
            Some(ref path) => path.clone(),
            None => return Ok(None),
        };

        let db_exists = has_db_files(&db_path, &blast.db);
        if !db_exists {
            if let Some(ref fasta) = blast.make_db_from {
                let makeblastdb =
                    find_binary("makeblastdb").ok_or_else(|| PipelineError::BlastDbError {
                        db: blast.db.clone(),
                        reason: "makeblastdb not found to build the database".to_string(),
                    })?;
                std::fs::create_dir_all(&db_path)?;
                info!("building BLAST database {} from {}", blast.db, fasta.display());
                ToolCommand::new(makeblastdb)
                    .arg("-in")
                    .arg(fasta.display().to_string())
                    .arg("-dbtype")
                    .arg("nucl")
                    .arg("-parse_seqids")
                    .arg("-out")
                    .arg(db_path.join(&blast.db).display().to_string())
                    .log_to(ctx.paths.blast_log())
                    .run()
                    .await?;
            } else {
                return Err(PipelineError::BlastDbError {
                    db: blast.db.clone(),
                    reason: format!("no database files under {}", db_path.display()),
                });
            }
        }
        Ok(Some(db_path))
    }

    async fn run_local(
        &self,
        ctx: &RunContext,
        query: &Path,
        db_path: &Path,
    ) -> Result<HashMap<String, Annotation>> {
        let blastn = find_binary("blastn").ok_or_else(|| PipelineError::BlastDbError {
            db: ctx.config.blast.db.clone(),
            reason: "blastn not found on PATH".to_string(),
        })?;

        let output = ToolCommand::new(blastn)
            .arg("-query")
            .arg(query.display().to_string())
            .arg("-db")
            .arg(&ctx.config.blast.db)
            .arg("-outfmt")
            .arg(OUTFMT)
            .arg("-num_threads")
            .arg(available_threads().to_string())
            .env("BLASTDB", db_path.display().to_string())
            .log_to(ctx.paths.blast_log())
            .stdout_to(ctx.paths.local_blast_hits())
            .timeout_seconds(ctx.config.blast.timeout_seconds)
            .run()
            .await?;

        Ok(parse_tabular_hits(&output.stdout))
    }

    /// The NCBI URL API: submit, poll the RID, fetch the tabular report.
    async fn run_remote(
        &self,
        ctx: &RunContext,
        missing: &[SeqRecord],
    ) -> Result<HashMap<String, Annotation>> {
        let client = reqwest::Client::new();
        let query_fasta: String = missing.iter().map(|r| r.to_fasta()).collect();

        let submit = client
            .post(NCBI_BLAST_URL)
            .form(&[
                ("CMD", "Put"),
                ("PROGRAM", "blastn"),
                ("DATABASE", ctx.config.blast.db.as_str()),
                ("QUERY", query_fasta.as_str()),
            ])
            .send()
            .await?
            .text()
            .await?;

        let rid = extract_field(&submit, "RID").ok_or_else(|| PipelineError::RemoteError {
            service: "NCBI BLAST".to_string(),
            message: "no request ID in submission response".to_string(),
        })?;
        info!("NCBI BLAST request submitted (RID {})", rid);

        let poll_delay = Duration::from_secs(ctx.config.remote.poll_seconds.max(10));
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(ctx.config.remote.timeout_seconds);
        loop {
            tokio::time::sleep(poll_delay).await;
            if tokio::time::Instant::now() > deadline {
                return Err(PipelineError::RemoteError {
                    service: "NCBI BLAST".to_string(),
                    message: format!("request {} timed out", rid),
                });
            }

            let status_page = client
                .get(NCBI_BLAST_URL)
                .query(&[
                    ("CMD", "Get"),
                    ("FORMAT_OBJECT", "SearchInfo"),
                    ("RID", rid.as_str()),
                ])
                .send()
                .await?
                .text()
                .await?;

            match extract_field(&status_page, "Status").as_deref() {
                Some("READY") => break,
                Some("WAITING") | None => {
                    debug!("RID {} still waiting", rid);
                }
                Some(other) => {
                    return Err(PipelineError::RemoteError {
                        service: "NCBI BLAST".to_string(),
                        message: format!("request {} ended with status {}", rid, other),
                    });
                }
            }
        }

        let report = client
            .get(NCBI_BLAST_URL)
            .query(&[
                ("CMD", "Get"),
                ("FORMAT_TYPE", "Tabular"),
                ("RID", rid.as_str()),
            ])
            .send()
            .await?
            .text()
            .await?;

        std::fs::write(ctx.paths.remote_blast_hits(), &report)?;
        Ok(parse_tabular_hits(&report))
    }
}

fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn has_db_files(dir: &Path, db: &str) -> bool {
    // nucleotide databases carry .nin/.nhr/.nsq volumes, possibly split
    ["nin", "nhr", "nsq", "nal"].iter().any(|ext| {
        dir.join(format!("{}.{}", db, ext)).is_file()
            || dir.join(format!("{}.00.{}", db, ext)).is_file()
    })
}

/// Parse `-outfmt 6` style hit lines, keeping the best hit per query
/// by bitscore. Remote reports lack the sscinames column; the species
/// field stays empty then.
fn parse_tabular_hits(text: &str) -> HashMap<String, Annotation> {
    let mut best: HashMap<String, (f64, Annotation)> = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('<') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 6 {
            continue;
        }
        let query = fields[0].to_string();
        let pident: f64 = match fields[2].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let bitscore: f64 = fields[5].parse().unwrap_or(0.0);
        let sciname = fields
            .get(6)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "N/A")
            .unwrap_or_default();

        let annotation = Annotation {
            accession: fields[1].to_string(),
            sciname,
            pident,
        };
        match best.get(&query) {
            Some((score, _)) if *score >= bitscore => {}
            _ => {
                best.insert(query, (bitscore, annotation));
            }
        }
    }

    best.into_iter()
        .map(|(query, (_, annotation))| (query, annotation))
        .collect()
}

fn extract_field(text: &str, key: &str) -> Option<String> {
    // both response shapes use `KEY = value` lines
    text.lines().find_map(|line| {
        let trimmed = line.trim();
        trimmed
            .strip_prefix(key)
            .and_then(|rest| rest.trim_start().strip_prefix('='))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tabular_keeps_best_hit() {
        let text = "\
s1\tMH855322.1\t99.2\t512\t0.0\t920\tFusarium oxysporum
s1\tKX123.1\t91.0\t500\t1e-100\t640\tFusarium solani
s2\tAB001.1\t88.8\t433\t1e-80\t510\tN/A
";
        let hits = parse_tabular_hits(text);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits["s1"].accession, "MH855322.1");
        assert_eq!(hits["s1"].sciname, "Fusarium oxysporum");
        assert_eq!(hits["s2"].sciname, "");
    }

    #[test]
    fn test_parse_tabular_skips_comments_and_html() {
        let text = "# BLASTN 2.13.0\n<html>noise</html>\n";
        assert!(parse_tabular_hits(text).is_empty());
    }

    #[test]
    fn test_extract_field() {
        let page = "    RID = ABC123XYZ\n    RTOE = 25\n";
        assert_eq!(extract_field(page, "RID").as_deref(), Some("ABC123XYZ"));
        assert_eq!(extract_field(page, "RTOE").as_deref(), Some("25"));
        assert!(extract_field(page, "Status").is_none());

        let status = "Status=WAITING\n";
        assert_eq!(extract_field(status, "Status").as_deref(), Some("WAITING"));
    }

    #[test]
    fn test_db_file_probe() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(!has_db_files(dir.path(), "nt"));
        std::fs::write(dir.path().join("nt.00.nin"), b"x").unwrap();
        assert!(has_db_files(dir.path(), "nt"));
    }
}
