use std::error::Error;

use clap::Args;
use segeval_exp::{generate_order, FileSet};
use serde_json::json;

use crate::{boxed, print_json, ConfigArgs};

#[derive(Args, Debug)]
pub struct OrderArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Number of volumes; when omitted the configured directories are indexed.
    #[arg(long)]
    pub count: Option<usize>,
    /// Emit JSON instead of one line per slot.
    #[arg(long)]
    pub json: bool,
}

/// Prints the unblinded order. Meant for audit after the experiment.
pub fn run(args: &OrderArgs) -> Result<(), Box<dyn Error>> {
    let config = args.config.resolve()?;
    let seed = config
        .seed
        .ok_or("a seed is required, pass --seed or set it in the configuration")?;
    let files = match args.count {
        Some(_) => None,
        None => Some(FileSet::index(&config.volumes_dir, &config.method_dirs)),
    };
    let sequence_count = match (args.count, &files) {
        (Some(count), _) => count,
        (None, Some(files)) => files.sequence_count().map_err(boxed)?,
        (None, None) => return Err("no volume count available".into()),
    };

    let order = generate_order(seed, sequence_count);
    let hash = order.hash().map_err(boxed)?;
    let rows: Vec<_> = order
        .slots()
        .iter()
        .enumerate()
        .map(|(index, slot)| {
            let volume = files.as_ref().and_then(|files| files.volume_name(slot.sequence));
            let segmentation = files.as_ref().and_then(|files| files.segmentation_name(*slot));
            json!({
                "evaluation": index + 1,
                "method": slot.method,
                "sequence": slot.sequence,
                "volume": volume,
                "segmentation": segmentation,
            })
        })
        .collect();

    if args.json {
        return print_json(&json!({
            "seed": seed.value(),
            "sequence_count": sequence_count,
            "order_hash": hash,
            "slots": rows,
        }));
    }

    println!("seed {seed}, {} evaluations, order {hash}", order.len());
    for (index, slot) in order.slots().iter().enumerate() {
        let volume = files
            .as_ref()
            .and_then(|files| files.volume_name(slot.sequence))
            .unwrap_or("-");
        println!(
            "{:>4}  method {}  sequence {:>3}  {}",
            index + 1,
            slot.method,
            slot.sequence,
            volume
        );
    }
    Ok(())
}
