use clap::CommandFactory;
use clap_complete::{generate_to, Shell};
use std::env;
use std::io::Error;

include!("src/cli.rs");

// Shell completions for ccsniff end up in OUT_DIR, ready for packaging.
fn main() -> Result<(), Error> {
    let Some(outdir) = env::var_os("OUT_DIR") else {
        return Ok(());
    };
    println!("cargo:rerun-if-changed=src/cli.rs");

    let mut command = Cli::command();
    for shell in Shell::value_variants() {
        generate_to(*shell, &mut command, "ccsniff", &outdir)?;
    }
    Ok(())
}
