use clap::Parser;

#[derive(Debug, Clone, clap::Parser)]
#[clap(version, about)]
#[clap(propagate_version = true)]
struct Cli {
    #[clap(subcommand)]
    commands: Commands,
}

#[derive(Debug, Clone, clap::Subcommand)]
enum Commands {
    /// Interact with the nextest runner.
    /// Will run the tests by default.
    #[clap(visible_alias = "t")]
    Test {
        /// The nextest subcommand to run.
        #[clap(default_value = "run")]
        subcommand: String,
        /// Extra arguments passed through to the runner.
        #[clap(last = true)]
        args: Vec<String>,
    },
    /// Run the headless formation demo.
    #[clap(visible_alias = "d")]
    Demo {
        /// Arguments passed through to the demo binary.
        #[clap(last = true)]
        args: Vec<String>,
    },
}

fn cargo() -> std::process::Command {
    std::process::Command::new(
        std::env::var("XTASK_CARGO_CMD").unwrap_or_else(|_| "cargo".into()),
    )
}

fn has_nextest() -> bool {
    cargo()
        .args(["nextest", "--version"])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    let status = match args.commands {
        Commands::Test { subcommand, args } => {
            let mut cargo_cmd = cargo();
            if has_nextest() {
                cargo_cmd.args(["nextest", subcommand.as_str(), "--workspace"]);
            } else {
                println!("cargo-nextest not found, falling back to cargo test");
                cargo_cmd.args(["test", "--workspace"]);
            }
            cargo_cmd.args(&args).status()?
        }
        Commands::Demo { args } => cargo()
            .args(["run", "--bin", "galacron", "--"])
            .args(&args)
            .status()?,
    };
    if !status.success() {
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}
