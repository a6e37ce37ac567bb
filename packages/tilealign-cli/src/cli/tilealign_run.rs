use crate::cli::tilealign_cli::{RunConfig, TilealignArgs, resolve_config};
use eyre::{Report, WrapErr};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tilealign::align::aligner::{PlainSearcher, Searcher};
use tilealign::align::params::SeqType;
use tilealign::align::translated::TranslatedSearcher;
use tilealign::cluster::coordinator::{
  Role, distribute_shard_plans, merge_shards, negotiate_roles, receive_shard_plan, rename_shards,
};
use tilealign::cluster::transport::{ShardPlan, Transport, host_name, transport_from_env};
use tilealign::index::ooc::{make_ooc, read_ooc};
use tilealign::io::fasta::read_all;
use tilealign::make_error;
use tilealign::mask::target_mask_bits;
use tilealign::output::OutputContext;
use tilealign::run::partition::partition_queries;
use tilealign::run::worker::{RunContext, WorkerTask, shard_path};
use tilealign::run::worker_pool::run_pool;
use tilealign::seq::{MaskBits, Seq};

const SHARD_POLL: Duration = Duration::from_secs(2);

pub fn tilealign_run(args: &TilealignArgs) -> Result<(), Report> {
  // Cluster membership settles before configuration is validated, so a
  // configuration error cannot leave peers waiting on a dismissal that
  // never comes.
  let mut transport = transport_from_env()?;
  let host = host_name();
  let (role, layout) = negotiate_roles(transport.as_mut(), &host, args.threads)?;

  let Role::Leader { threads, base } = role else {
    info!("rank {}: host {host} is led by a peer process, exiting", transport.rank());
    return Ok(());
  };

  let config = resolve_config(args)?;
  let world = transport.world_size();
  let multi_worker = world > 1 || threads > 1;
  if multi_worker && matches!(config.output.as_str(), "" | "stdin" | "stdout" | "-") {
    return make_error!("Output name must be specified when using multiple workers");
  }

  let targets = load_database(&config)?;
  info!(
    "Loaded {} sequences, {} letters from {:#?}",
    targets.len(),
    targets.iter().map(Seq::len).sum::<usize>(),
    config.database
  );

  if let Some(ooc_path) = &config.make_ooc {
    // Build the over-occurring tile list and stop; one process is plenty.
    if transport.rank() == 0 {
      let spec = tilealign::index::tile::TileSpec::new(config.params.tile_size, config.params.is_prot_like())?;
      make_ooc(ooc_path, &targets, spec, config.params.step_size, config.params.rep_match)?;
      println!("Done making {}", ooc_path.display());
    }
    return Ok(());
  }

  let searcher = build_searcher(&config, targets)?;

  let plan = exchange_shard_plan(transport.as_mut(), &config, layout.as_ref(), threads)?;
  drop(transport);

  run_leader(&config, &searcher, &plan, threads, base)?;

  // Rank 0 stitches the shards into the final output.
  if let Some(layout) = &layout {
    if layout.total_workers > 1 {
      merge_shards(Path::new(&config.output), layout.total_workers, SHARD_POLL)?;
    }
  }
  if config.dots > 0 {
    println!();
  }
  Ok(())
}

/// The database with its masking state resolved: mask bits that suppress
/// seeding, repeat bits for separate reporting, and upper-cased sequence
/// buffers for extension.
struct MaskedTargets {
  targets: Vec<Seq>,
  index_masks: Option<Vec<Option<MaskBits>>>,
  repeat_bits: Vec<Option<MaskBits>>,
}

fn load_database(config: &RunConfig) -> Result<Vec<Seq>, Report> {
  let records = read_all(&config.database).wrap_err_with(|| format!("When reading database {:#?}", config.database))?;
  if records.is_empty() {
    return make_error!("Database {:#?} contains no sequences", config.database);
  }
  Ok(records.into_iter().map(|r| Seq::new(r.seq_name, r.seq)).collect())
}

fn mask_targets(config: &RunConfig, mut targets: Vec<Seq>) -> Result<MaskedTargets, Report> {
  let index_masks = config
    .mask
    .as_ref()
    .map(|source| target_mask_bits(source, &targets, config.min_rep_divergence))
    .transpose()?;
  let repeat_bits = match &config.repeats {
    Some(source) => target_mask_bits(source, &targets, config.min_rep_divergence)?,
    None => targets.iter().map(|_| None).collect(),
  };
  for target in &mut targets {
    target.to_upper();
  }
  // Masked areas are ignored entirely in protein searches, not only kept
  // out of the index; the translated path blanks before translation itself.
  if config.params.t_type == SeqType::Prot {
    if let Some(masks) = &index_masks {
      for (target, mask) in targets.iter_mut().zip(masks) {
        if let Some(mask) = mask {
          for (pos, c) in target.seq.iter_mut().enumerate() {
            if mask.get(pos) {
              *c = b'X';
            }
          }
        }
      }
    }
  }
  Ok(MaskedTargets {
    targets,
    index_masks,
    repeat_bits,
  })
}

fn build_searcher(config: &RunConfig, targets: Vec<Seq>) -> Result<Searcher, Report> {
  let masked = mask_targets(config, targets)?;
  let ooc_set = config
    .ooc
    .as_ref()
    .map(|path| read_ooc(path, config.params.tile_size))
    .transpose()?;

  if config.params.t_type == SeqType::Dnax {
    let searcher = TranslatedSearcher::build(
      &masked.targets,
      masked.index_masks.as_deref(),
      &config.params,
      ooc_set.as_ref(),
    )?;
    Ok(Searcher::Translated(searcher))
  } else {
    let searcher = PlainSearcher::build(
      masked.targets,
      masked.index_masks.as_deref(),
      masked.repeat_bits,
      &config.params,
      ooc_set.as_ref(),
    )?;
    Ok(Searcher::Plain(searcher))
  }
}

fn exchange_shard_plan(
  transport: &mut dyn Transport,
  config: &RunConfig,
  layout: Option<&tilealign::cluster::coordinator::ClusterLayout>,
  threads: usize,
) -> Result<ShardPlan, Report> {
  match layout {
    Some(layout) => {
      let partition = partition_queries(&config.query, layout.total_workers)
        .wrap_err_with(|| format!("When partitioning query file {:#?}", config.query))?;
      info!(
        "Partitioned {} queries into {} shards of up to {} queries",
        partition.total_queries, layout.total_workers, partition.per_worker
      );
      distribute_shard_plans(transport, layout, &partition)
    }
    None => {
      let plan = receive_shard_plan(transport)?;
      if plan.offsets.len() != threads {
        return make_error!(
          "Protocol error: received {} worker offsets for {threads} local workers",
          plan.offsets.len()
        );
      }
      Ok(plan)
    }
  }
}

fn run_leader(config: &RunConfig, searcher: &Searcher, plan: &ShardPlan, threads: usize, base: usize) -> Result<(), Report> {
  let searched_letters: u64 = searcher_letters(searcher);
  let out_ctx = OutputContext {
    database: config.database.display().to_string(),
    db_seq_count: searcher_seq_count(searcher),
    db_letters: searched_letters,
    q_is_prot: config.params.q_type.is_prot_like(),
    t_is_prot: config.params.t_type.is_prot_like(),
    min_identity: config.params.min_identity,
  };
  let ctx = RunContext {
    searcher,
    params: &config.params,
    q_mask: config.q_mask,
    format: config.format,
    out_ctx: &out_ctx,
    no_head: config.no_head,
    dots: config.dots,
  };

  let output = PathBuf::from(&config.output);
  let tasks: Vec<WorkerTask> = (0..threads)
    .map(|i| WorkerTask {
      worker_index: i,
      global_index: base + i,
      query_path: config.query.clone(),
      start_offset: plan.offsets[i],
      query_budget: plan.per_worker,
      out_path: shard_path(&output, base + i),
    })
    .collect();

  run_pool(&tasks, &ctx)?;
  rename_shards(&output, base, threads)?;
  Ok(())
}

fn searcher_seq_count(searcher: &Searcher) -> usize {
  match searcher {
    Searcher::Plain(s) => s.targets.len(),
    Searcher::Translated(s) => s.meta.len(),
  }
}

fn searcher_letters(searcher: &Searcher) -> u64 {
  match searcher {
    Searcher::Plain(s) => s.targets.iter().map(|t| t.len() as u64).sum(),
    Searcher::Translated(s) => s.meta.iter().map(|m| m.dna_size as u64).sum(),
  }
}
