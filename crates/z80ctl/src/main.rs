use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = z80ctl::Cli::parse();
    z80ctl::init_logging(cli.verbose);
    z80ctl::run(cli)
}
