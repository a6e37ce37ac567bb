use clap::Parser;
use eyre::Report;
use log::LevelFilter;
use std::path::PathBuf;
use tilealign::align::params::{AlignParams, AlignParamsOptional, SeqType};
use tilealign::make_error;
use tilealign::mask::{MaskSource, QueryMask};
use tilealign::output::OutputFormat;
use tilealign::utils::global_init::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "tilealign", version)]
#[command(verbatim_doc_comment)]
/// Fast local alignment of DNA and protein sequences against a tiled
/// target index, with cluster parallel execution.
///
/// Run it under a process launcher to spread one query set over many hosts:
///
///    mpirun -n <N> tilealign database query output
///
/// where database and query are FASTA files and output receives the
/// alignment table. One process per host is elected to do that host's work
/// with as many workers as the host had processes; the others exit.
pub struct TilealignArgs {
  /// Database file (FASTA)
  pub database: PathBuf,

  /// Query file (FASTA). With more than one worker this must be a seekable
  /// file, not a pipe.
  pub query: PathBuf,

  /// Where to put the output; `stdout` is accepted for single-worker runs
  pub output: String,

  /// Database type
  #[arg(short = 't', long = "t", value_enum)]
  pub t_type: Option<SeqType>,

  /// Query type
  #[arg(short = 'q', long = "q", value_enum)]
  pub q_type: Option<SeqType>,

  /// Synonymous with -t prot -q prot
  #[arg(long)]
  pub prot: bool,

  /// Use overused tile file. N should correspond to the tileSize
  #[arg(long)]
  pub ooc: Option<PathBuf>,

  /// Make an overused tile file and exit without aligning. The target
  /// should be a complete genome
  #[arg(long, alias = "makeOoc")]
  pub make_ooc: Option<PathBuf>,

  /// Mask out repeats. Alignments won't be started in masked regions but
  /// may extend through them in nucleotide searches. Masked areas are
  /// ignored entirely in protein or translated searches.
  /// One of: lower, upper, out, or a RepeatMasker .out file
  #[arg(long)]
  pub mask: Option<String>,

  /// Mask out repeats in the query sequence: lower or upper
  #[arg(long, alias = "qMask")]
  pub q_mask: Option<String>,

  /// Repeat bases will not be masked in any way, but matches in repeat
  /// areas will be reported separately from matches in other areas
  #[arg(long)]
  pub repeats: Option<String>,

  /// Minimum percent divergence of repeats to allow them to be unmasked.
  /// Only relevant for masking using RepeatMasker .out files
  #[arg(long, alias = "minRepDivergence", default_value_t = 15.0)]
  pub min_rep_divergence: f64,

  /// Output a dot every N sequences to show progress
  #[arg(long, default_value_t = 0)]
  pub dots: usize,

  /// Suppress the output header, making the result a plain tab-separated
  /// file
  #[arg(long, alias = "noHead")]
  pub no_head: bool,

  /// Output file format
  #[arg(long, value_enum)]
  pub out: Option<OutputFormat>,

  /// Worker threads for a single-process run. Under a cluster launcher the
  /// per-host process count decides this instead.
  #[arg(long, default_value_t = num_cpus::get())]
  pub threads: usize,

  #[command(flatten)]
  pub align_params: AlignParamsOptional,

  /// Make output more verbose (-v: info, -vv: debug, -vvv: trace)
  #[arg(short = 'v', long, action = clap::ArgAction::Count)]
  pub verbose: u8,

  /// Set verbosity level explicitly
  #[arg(long, conflicts_with = "verbose", conflicts_with = "silent")]
  pub verbosity: Option<LevelFilter>,

  /// Disable all console output. Same as --verbosity=off
  #[arg(long, conflicts_with = "verbose")]
  pub silent: bool,
}

/// Everything a run needs, resolved and validated once. Immutable from here
/// on; workers receive it by reference.
#[derive(Debug, Clone)]
pub struct RunConfig {
  pub database: PathBuf,
  pub query: PathBuf,
  pub output: String,
  pub params: AlignParams,
  pub mask: Option<MaskSource>,
  pub repeats: Option<MaskSource>,
  pub q_mask: Option<QueryMask>,
  pub min_rep_divergence: f64,
  pub ooc: Option<PathBuf>,
  pub make_ooc: Option<PathBuf>,
  pub format: OutputFormat,
  pub no_head: bool,
  pub dots: usize,
  pub threads: usize,
}

pub fn parse_cli_args() -> Result<TilealignArgs, Report> {
  let args = TilealignArgs::parse();

  // --verbosity=<level> and --silent take priority over -v
  let filter_level = if args.silent {
    LevelFilter::Off
  } else {
    match args.verbosity {
      Some(verbosity) => verbosity,
      None => match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
      },
    }
  };
  setup_logger(filter_level);

  Ok(args)
}

pub fn resolve_config(args: &TilealignArgs) -> Result<RunConfig, Report> {
  let (mut t_type, mut q_type) = (args.t_type.unwrap_or(SeqType::Dna), args.q_type.unwrap_or(SeqType::Dna));
  if args.prot {
    t_type = SeqType::Prot;
    q_type = SeqType::Prot;
  }

  match (t_type, q_type) {
    (SeqType::Dna, SeqType::Dna | SeqType::Rna)
    | (SeqType::Prot, SeqType::Prot)
    | (SeqType::Dnax, SeqType::Prot | SeqType::Dnax | SeqType::Rnax) => {}
    _ => return make_error!("Unrecognized combination of target and query types"),
  }

  let params = AlignParams::resolve(&args.align_params, t_type, q_type)?;

  for path in [&args.database, &args.query] {
    let name = path.display().to_string();
    if name.ends_with(".2bit") || name.ends_with(".nib") || name.contains(".2bit:") {
      return make_error!("{name}: only FASTA sequence files are supported by this build");
    }
  }

  let mask = args.mask.as_deref().map(|m| MaskSource::parse(m, &args.database)).transpose()?;
  let mut repeats = args
    .repeats
    .as_deref()
    .map(|m| MaskSource::parse(m, &args.database))
    .transpose()?;
  if let (Some(mask), Some(repeats)) = (&mask, &repeats) {
    if mask != repeats {
      return make_error!("The -mask and -repeats settings disagree. You can just omit -repeats if -mask is on");
    }
  }
  if mask.is_some() {
    // Mask setting will also set repeats.
    repeats = mask.clone();
  }

  let q_mask = args.q_mask.as_deref().map(QueryMask::parse).transpose()?;

  Ok(RunConfig {
    database: args.database.clone(),
    query: args.query.clone(),
    output: args.output.clone(),
    params,
    mask,
    repeats,
    q_mask,
    min_rep_divergence: args.min_rep_divergence,
    ooc: args.ooc.clone(),
    make_ooc: args.make_ooc.clone(),
    format: args.out.unwrap_or_default(),
    no_head: args.no_head,
    dots: args.dots,
    threads: args.threads,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn args(extra: &[&str]) -> TilealignArgs {
    let mut argv = vec!["tilealign", "db.fa", "query.fa", "out.psl"];
    argv.extend_from_slice(extra);
    TilealignArgs::parse_from(argv)
  }

  #[rstest]
  fn defaults_to_dna_against_dna() {
    let config = resolve_config(&args(&[])).unwrap();
    assert_eq!(config.params.t_type, SeqType::Dna);
    assert_eq!(config.params.q_type, SeqType::Dna);
    assert_eq!(config.params.tile_size, 11);
    assert_eq!(config.format, OutputFormat::Psl);
  }

  #[rstest]
  fn prot_shorthand_sets_both_types() {
    let config = resolve_config(&args(&["--prot"])).unwrap();
    assert_eq!(config.params.t_type, SeqType::Prot);
    assert_eq!(config.params.q_type, SeqType::Prot);
    assert_eq!(config.params.tile_size, 5);
    assert!((config.params.min_identity - 25.0).abs() < f64::EPSILON);
  }

  #[rstest]
  fn rejects_mixed_type_combinations() {
    assert!(resolve_config(&args(&["-t", "dna", "-q", "prot"])).is_err());
    assert!(resolve_config(&args(&["-t", "prot", "-q", "dnax"])).is_err());
  }

  #[rstest]
  fn accepts_translated_combinations() {
    let config = resolve_config(&args(&["-t", "dnax", "-q", "prot"])).unwrap();
    assert_eq!(config.params.t_type, SeqType::Dnax);
    let config = resolve_config(&args(&["-t", "dnax", "-q", "rnax"])).unwrap();
    assert!(config.params.trim_a);
  }

  #[rstest]
  fn mask_and_repeats_must_agree() {
    assert!(resolve_config(&args(&["--mask", "lower", "--repeats", "upper"])).is_err());
    let config = resolve_config(&args(&["--mask", "lower"])).unwrap();
    assert_eq!(config.repeats, Some(MaskSource::CaseLower));
    let config = resolve_config(&args(&["--mask", "lower", "--repeats", "lower"])).unwrap();
    assert_eq!(config.repeats, Some(MaskSource::CaseLower));
  }

  #[rstest]
  fn rejects_non_fasta_databases() {
    let parsed = TilealignArgs::parse_from(["tilealign", "db.2bit", "q.fa", "out.psl"]);
    assert!(resolve_config(&parsed).is_err());
    let parsed = TilealignArgs::parse_from(["tilealign", "db.fa", "q.nib", "out.psl"]);
    assert!(resolve_config(&parsed).is_err());
  }

  #[rstest]
  fn historical_camel_case_aliases_still_parse() {
    let parsed = args(&["--tileSize", "8", "--minMatch", "1", "--noHead", "--makeOoc", "11.ooc"]);
    let config = resolve_config(&parsed).unwrap();
    assert_eq!(config.params.tile_size, 8);
    assert_eq!(config.params.min_match, 1);
    assert!(config.no_head);
    assert_eq!(config.make_ooc, Some(PathBuf::from("11.ooc")));
  }
}
