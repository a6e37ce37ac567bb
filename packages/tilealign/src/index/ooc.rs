//! Over-occurring tile ("ooc") files: a binary list of tile values that are
//! too frequent in a target to be worth seeding from. Layout is a little-
//! endian signature, the tile size, then packed `u32` tile values.

use crate::index::tile::TileSpec;
use crate::index::tile_index::count_tiles;
use crate::io::fs::ensure_dir;
use crate::make_error;
use crate::seq::Seq;
use eyre::{Report, WrapErr};
use log::info;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const OOC_SIG: u32 = 0x6F6F_6331; // "ooc1"

pub fn write_ooc_impl<W: Write>(mut writer: W, tile_size: usize, values: &[u32]) -> Result<(), Report> {
  writer.write_all(&OOC_SIG.to_le_bytes())?;
  writer.write_all(&(tile_size as u32).to_le_bytes())?;
  for value in values {
    writer.write_all(&value.to_le_bytes())?;
  }
  Ok(())
}

pub fn read_ooc_impl<R: Read>(mut reader: R, expected_tile_size: usize) -> Result<HashSet<u32>, Report> {
  let mut word = [0_u8; 4];

  reader.read_exact(&mut word)?;
  if u32::from_le_bytes(word) != OOC_SIG {
    return make_error!("Not an ooc file (bad signature)");
  }

  reader.read_exact(&mut word)?;
  let tile_size = u32::from_le_bytes(word) as usize;
  if tile_size != expected_tile_size {
    return make_error!("ooc file was built with tileSize {tile_size}, but this run uses tileSize {expected_tile_size}");
  }

  let mut values = HashSet::new();
  loop {
    match reader.read_exact(&mut word) {
      Ok(()) => {
        values.insert(u32::from_le_bytes(word));
      }
      Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
      Err(err) => return Err(err.into()),
    }
  }
  Ok(values)
}

pub fn read_ooc(path: impl AsRef<Path>, expected_tile_size: usize) -> Result<HashSet<u32>, Report> {
  let path = path.as_ref();
  let file = File::open(path).wrap_err_with(|| format!("When opening ooc file: {path:#?}"))?;
  read_ooc_impl(BufReader::new(file), expected_tile_size).wrap_err_with(|| format!("When reading ooc file: {path:#?}"))
}

/// Counts tiles over the whole target and writes out every tile whose count
/// exceeds `rep_match`. Runs single-threaded; the caller exits afterwards
/// without aligning.
pub fn make_ooc(
  path: impl AsRef<Path>,
  targets: &[Seq],
  spec: TileSpec,
  step_size: usize,
  rep_match: usize,
) -> Result<(), Report> {
  let path = path.as_ref();
  let counts = count_tiles(targets, None, spec, step_size);
  let values: Vec<u32> = counts
    .iter()
    .enumerate()
    .filter(|&(_value, &count)| count as usize > rep_match)
    .map(|(value, _count)| value as u32)
    .collect();

  ensure_dir(path)?;
  let file = File::create(path).wrap_err_with(|| format!("When creating ooc file: {path:#?}"))?;
  write_ooc_impl(BufWriter::new(file), spec.tile_size, &values)
    .wrap_err_with(|| format!("When writing ooc file: {path:#?}"))?;

  info!("Wrote {} over-occurring tiles to {path:#?}", values.len());
  Ok(())
}
