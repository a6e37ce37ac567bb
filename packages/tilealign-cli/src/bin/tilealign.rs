use eyre::Report;
use tilealign_cli::cli::tilealign_cli::parse_cli_args;
use tilealign_cli::cli::tilealign_run::tilealign_run;

fn main() -> Result<(), Report> {
  color_eyre::config::HookBuilder::default()
    .panic_section("If you think this is a bug, please report it with the command line that triggered it.")
    .install()?;

  let args = parse_cli_args()?;
  tilealign_run(&args)
}
