mod assembly;
mod basecall;
mod batch;
mod cli;
mod config;
mod io;
mod process;
mod runner;
mod sample;
mod status;
#[cfg(test)]
mod testing;

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let cfg = cli::handle_cli().with_context(|| "Error processing command line arguments")?;
    batch::run_batch(&cfg, &mut runner::SystemRunner)?;
    Ok(())
}
