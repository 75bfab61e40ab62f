// CLI modules
mod cli;
mod state;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Delete, Init, Upload, Version};

command_enum! {
    (Delete, Delete),
    (Init, Init),
    (Upload, Upload),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Log level: explicit flag > config file > warn
    let log_level = cli::op::resolve_log_level(args.log_level, args.config_path.clone());
    if let Err(e) = cli::op::init_logging(log_level) {
        eprintln!("Warning: {}", e);
    }

    let ctx = cli::op::OpContext::new(args.config_path);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
