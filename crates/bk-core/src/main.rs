use bk_core::cli::{run, Cli};
use clap::Parser;

fn main() {
    let cli = Cli::parse();
    let code = run(&cli);
    std::process::exit(code.as_i32());
}
