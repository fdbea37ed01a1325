use std::error::Error;

use clap::Args;
use segeval_core::Seed;

use crate::boxed;

#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Check a seed instead of drawing a new one.
    #[arg(long)]
    pub validate: Option<String>,
}

pub fn run(args: &SeedArgs) -> Result<(), Box<dyn Error>> {
    let seed = match &args.validate {
        Some(text) => Seed::parse(text).map_err(boxed)?,
        None => Seed::random(),
    };
    println!("{seed}");
    Ok(())
}
