use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "parley-server", about = "Parley marketplace chat server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/parley.toml")]
    pub config: String,

    /// Insert a small set of demo users, listings and commissions on startup
    #[arg(long)]
    pub seed_demo: bool,
}
