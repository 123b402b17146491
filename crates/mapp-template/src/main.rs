//! Binary entrypoint for the project generator.

use std::path::PathBuf;

use clap::Parser;

use mapp_template::{ProjectGenerator, TemplateSet};

#[derive(Parser)]
#[command(name = "mapp-template", version, about = "Generate a project scaffold from a spec")]
struct Cli {
    /// Project spec (.yaml/.yml/.json); bundled demo names also work
    #[arg(long)]
    spec: PathBuf,

    /// Output directory
    #[arg(short = 'o', long)]
    out: PathBuf,

    /// Alternative templates file
    #[arg(long)]
    templates: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let spec = mapp_spec::load_normalized(&cli.spec, true)?;

    let templates = match &cli.templates {
        Some(path) => TemplateSet::load(path)?,
        None => TemplateSet::default_set()?,
    };
    let generator = ProjectGenerator::new(templates);
    let written = generator.generate(&spec, &cli.out)?;

    for path in &written {
        println!("wrote {}", path.display());
    }
    Ok(())
}
