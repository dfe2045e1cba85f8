use anyhow::Result;
use treeline::cli::App;

#[tokio::main]
async fn main() -> Result<()> {
    let args = treeline::cli::Args::parse_args();
    let mut app = App::from_args(&args)?;

    app.run(args).await?;

    Ok(())
}
