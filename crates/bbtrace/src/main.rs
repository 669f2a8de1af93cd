use anyhow::{Context, Result};
use bbtrace::ir::Module;
use bbtrace::{run_pipeline, PASS_NAME};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

/// bbtrace — basic-block trace instrumentation driver.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input module (JSON-serialized IR)
    input: PathBuf,

    /// Comma-separated pass pipeline to run
    #[arg(long, default_value = PASS_NAME)]
    passes: String,

    /// Output path for the rewritten module (stdout if omitted)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Print the rewritten IR to stderr in textual form
    #[arg(long)]
    print_ir: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    eprintln!(
        "bbtrace: running '{}' on {}",
        cli.passes,
        cli.input.display(),
    );

    let bytes =
        fs::read(&cli.input).with_context(|| format!("failed to read {}", cli.input.display()))?;
    let mut module: Module =
        serde_json::from_slice(&bytes).context("failed to parse input module")?;

    let status = run_pipeline(&cli.passes, &mut module).context("pass pipeline failed")?;

    if cli.print_ir {
        print_module_ir(&module);
    }

    let json = serde_json::to_string_pretty(&module).context("failed to serialize module")?;
    if let Some(output_path) = cli.output {
        fs::write(&output_path, &json)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        eprintln!("bbtrace: wrote {}", output_path.display());
    } else {
        println!("{}", json);
    }

    eprintln!("bbtrace: done ({:?})", status);
    Ok(())
}

/// Dump the module's functions to stderr in the textual instruction form.
fn print_module_ir(module: &Module) {
    for func in &module.functions {
        if func.is_declaration() {
            eprintln!("declare @{}", func.name);
            continue;
        }
        eprintln!("define @{} {{", func.name);
        for block in &func.blocks {
            let label = block.name.clone().unwrap_or_else(|| block.id.to_string());
            eprintln!("{}:", label);
            for inst in &block.insts {
                eprintln!("  {}", inst);
            }
            eprintln!("  {}", block.terminator);
        }
        eprintln!("}}");
    }
}
