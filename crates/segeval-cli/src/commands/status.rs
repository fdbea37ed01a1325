use std::error::Error;

use clap::Args;
use segeval_core::{METHOD_COUNT, QUESTION_COUNT};
use segeval_exp::{load_provenance, sidecar_path, FileSet, ScoreStore};
use serde_json::json;

use crate::{boxed, print_json, ConfigArgs};

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Emit JSON only.
    #[arg(long)]
    pub json: bool,
}

/// Reports progress without revealing which method produced which score.
pub fn run(args: &StatusArgs) -> Result<(), Box<dyn Error>> {
    let config = args.config.resolve()?;
    if config.output_file.as_os_str().is_empty() {
        return Err("no score table given, pass --output or set output_file".into());
    }
    let store = ScoreStore::open_csv(&config.output_file).map_err(boxed)?;
    let provenance = load_provenance(&sidecar_path(&config.output_file)).map_err(boxed)?;
    let expected = if config.volumes_dir.as_os_str().is_empty() {
        None
    } else {
        FileSet::index(&config.volumes_dir, &config.method_dirs)
            .sequence_count()
            .ok()
            .map(|count| count * METHOD_COUNT)
    };

    let scored = store.scored_count();
    let total = store.len();
    let mut sums = [0i64; QUESTION_COUNT];
    for record in store.rows().flatten() {
        for (sum, value) in sums.iter_mut().zip(record.scores.values()) {
            *sum += value;
        }
    }
    let means: Vec<Option<f64>> = sums
        .iter()
        .map(|&sum| (scored > 0).then(|| sum as f64 / scored as f64))
        .collect();

    if args.json {
        return print_json(&json!({
            "path": config.output_file.display().to_string(),
            "rows": total,
            "scored": scored,
            "expected_rows": expected,
            "question_means": means,
            "seed": provenance.as_ref().map(|p| p.seed),
            "created_at": provenance.as_ref().map(|p| p.created_at.clone()),
        }));
    }

    let percent = if total == 0 {
        0.0
    } else {
        100.0 * scored as f64 / total as f64
    };
    println!("{scored} of {total} evaluations scored ({percent:.1}%)");
    for (question, mean) in means.iter().enumerate() {
        match mean {
            Some(mean) => println!("  Q{} mean {mean:.2}", question + 1),
            None => println!("  Q{} -", question + 1),
        }
    }
    if let Some(provenance) = &provenance {
        println!("seed {} started {}", provenance.seed, provenance.created_at);
    }
    if let Some(expected) = expected.filter(|&expected| expected != total) {
        println!("warning: configured directories give {expected} evaluations");
    }
    Ok(())
}
