use std::error::Error;

use clap::Args;
use segeval_core::METHOD_COUNT;
use segeval_exp::{FileListing, FileSet, ListingStatus};
use serde_json::json;

use crate::{boxed, display_path, print_json, ConfigArgs};

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Emit JSON only.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &CheckArgs) -> Result<(), Box<dyn Error>> {
    let config = args.config.resolve()?;
    let missing: Vec<String> = config
        .missing_fields()
        .iter()
        .map(ToString::to_string)
        .collect();
    let files = FileSet::index(&config.volumes_dir, &config.method_dirs);
    let counted = files.sequence_count();

    let listings: Vec<(String, &FileListing)> =
        std::iter::once(("volumes".to_string(), &files.volumes))
            .chain(
                files
                    .methods
                    .iter()
                    .enumerate()
                    .map(|(method, listing)| (format!("method{}", method + 1), listing)),
            )
            .collect();

    if args.json {
        let entries: Vec<_> = listings
            .iter()
            .map(|(name, listing)| {
                json!({
                    "name": name,
                    "directory": listing.directory.display().to_string(),
                    "found": listing.status == ListingStatus::Found,
                    "files": listing.len(),
                })
            })
            .collect();
        print_json(&json!({
            "listings": entries,
            "consistent": files.is_consistent(),
            "evaluations": counted.as_ref().ok().map(|count| count * METHOD_COUNT),
            "error": counted.as_ref().err().map(|err| err.code().to_string()),
            "missing_config": missing,
        }))?;
    } else {
        for (name, listing) in &listings {
            let state = match listing.status {
                ListingStatus::Found => format!("{} files", listing.len()),
                ListingStatus::DirectoryNotFound => "not found".to_string(),
            };
            println!("{name:<8} {:<40} {state}", display_path(&listing.directory));
        }
        if !missing.is_empty() {
            println!("missing configuration: {}", missing.join(", "));
        }
        if let Ok(count) = &counted {
            println!("ok: {count} volumes, {} evaluations", count * METHOD_COUNT);
        }
    }

    counted.map(|_| ()).map_err(boxed)
}
