use crate::cli::args::{CompareArgs, OutputFormat};
use crate::exit_codes::EXIT_SUCCESS;
use anyhow::{Context, Result};
use ifc_regress_core::report::console;
use ifc_regress_core::{compare_sets, ResultSet};

pub fn run(args: CompareArgs) -> Result<i32> {
    let baseline = ResultSet::load_from_file(&args.baseline)
        .with_context(|| format!("failed to load baseline {}", args.baseline.display()))?;
    let current = ResultSet::load_from_file(&args.current)
        .with_context(|| format!("failed to load report {}", args.current.display()))?;

    let (entries, summary) = compare_sets(&baseline, &current);
    match args.format {
        OutputFormat::Text => print!("{}", console::comparison_text(&entries, &summary)),
        OutputFormat::Json => {
            let doc = serde_json::json!({
                "baseline": args.baseline.display().to_string(),
                "current": args.current.display().to_string(),
                "summary": summary,
                "files": entries,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(EXIT_SUCCESS)
}
