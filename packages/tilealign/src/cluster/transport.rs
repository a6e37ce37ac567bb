//! Point-to-point message transport between ranks. All protocol traffic
//! involves rank 0, so non-root transports only hold one connection. Three
//! implementations: single-process, TCP (rank and rendezvous address from
//! the environment the runner sets up), and in-memory channels for
//! exercising the coordinator without a cluster.

use crate::make_error;
use eyre::{Report, WrapErr, eyre};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

/// What rank 0 tells every other rank after grouping processes by host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Assignment {
  /// This process is its host's leader and runs `threads` workers whose
  /// global shard numbers start at `base`.
  Lead { threads: usize, base: usize },
  /// Another process on the same host leads; exit after teardown.
  Dismiss,
}

/// The shard plan a leader receives: one starting offset per local worker
/// plus the shared per-worker query budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardPlan {
  pub per_worker: usize,
  pub offsets: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
  Announce { host: String },
  Assignment(Assignment),
  ShardPlan(ShardPlan),
}

pub trait Transport: Send {
  fn rank(&self) -> usize;
  fn world_size(&self) -> usize;
  fn send(&mut self, to: usize, message: &Message) -> Result<(), Report>;
  fn recv(&mut self, from: usize) -> Result<Message, Report>;
}

/// The world of one: no peers, no traffic.
pub struct LocalTransport;

impl Transport for LocalTransport {
  fn rank(&self) -> usize {
    0
  }

  fn world_size(&self) -> usize {
    1
  }

  fn send(&mut self, to: usize, _message: &Message) -> Result<(), Report> {
    make_error!("no rank {to} to send to in a single-process run")
  }

  fn recv(&mut self, from: usize) -> Result<Message, Report> {
    make_error!("no rank {from} to receive from in a single-process run")
  }
}

const FRAME_LEN_LIMIT: u32 = 64 * 1024 * 1024;

fn write_frame(stream: &mut TcpStream, message: &Message) -> Result<(), Report> {
  let payload = serde_json::to_vec(message)?;
  stream.write_all(&(payload.len() as u32).to_le_bytes())?;
  stream.write_all(&payload)?;
  stream.flush()?;
  Ok(())
}

fn read_frame(stream: &mut TcpStream) -> Result<Message, Report> {
  let mut len = [0_u8; 4];
  stream.read_exact(&mut len)?;
  let len = u32::from_le_bytes(len);
  if len > FRAME_LEN_LIMIT {
    return make_error!("coordination frame of {len} bytes exceeds the limit");
  }
  let mut payload = vec![0_u8; len as usize];
  stream.read_exact(&mut payload)?;
  Ok(serde_json::from_slice(&payload)?)
}

/// TCP transport. Rank 0 listens on the rendezvous address; every other rank
/// connects and identifies itself with its rank number.
pub struct TcpTransport {
  rank: usize,
  world: usize,
  /// Rank 0: connection per peer rank (index 0 unused).
  peers: Vec<Option<TcpStream>>,
  /// Other ranks: the connection to rank 0.
  root: Option<TcpStream>,
}

impl TcpTransport {
  pub fn connect(rank: usize, world: usize, coord_addr: &str) -> Result<Self, Report> {
    if rank == 0 {
      let listener = TcpListener::bind(coord_addr)
        .wrap_err_with(|| format!("When binding coordinator address {coord_addr}"))?;
      let mut peers: Vec<Option<TcpStream>> = (0..world).map(|_| None).collect();
      for _ in 1..world {
        let (mut stream, addr) = listener.accept().wrap_err("When accepting a peer connection")?;
        let mut rank_buf = [0_u8; 4];
        stream.read_exact(&mut rank_buf).wrap_err("When reading peer rank")?;
        let peer_rank = u32::from_le_bytes(rank_buf) as usize;
        if peer_rank == 0 || peer_rank >= world || peers[peer_rank].is_some() {
          return make_error!("Peer at {addr} announced invalid rank {peer_rank}");
        }
        debug!("rank 0: peer rank {peer_rank} connected from {addr}");
        peers[peer_rank] = Some(stream);
      }
      Ok(Self {
        rank,
        world,
        peers,
        root: None,
      })
    } else {
      // The coordinator may come up later than we do.
      let mut stream = None;
      for _attempt in 0..240 {
        match TcpStream::connect(coord_addr) {
          Ok(s) => {
            stream = Some(s);
            break;
          }
          Err(_) => std::thread::sleep(Duration::from_millis(500)),
        }
      }
      let mut stream =
        stream.ok_or_else(|| eyre!("Could not reach coordinator at {coord_addr} from rank {rank}"))?;
      stream.write_all(&(rank as u32).to_le_bytes())?;
      stream.flush()?;
      Ok(Self {
        rank,
        world,
        peers: Vec::new(),
        root: Some(stream),
      })
    }
  }

  fn stream_for(&mut self, other: usize) -> Result<&mut TcpStream, Report> {
    if self.rank == 0 {
      self
        .peers
        .get_mut(other)
        .and_then(Option::as_mut)
        .ok_or_else(|| eyre!("no connection to rank {other}"))
    } else if other == 0 {
      self.root.as_mut().ok_or_else(|| eyre!("not connected to rank 0"))
    } else {
      Err(eyre!("rank {} cannot talk to rank {other} directly", self.rank))
    }
  }
}

impl Transport for TcpTransport {
  fn rank(&self) -> usize {
    self.rank
  }

  fn world_size(&self) -> usize {
    self.world
  }

  fn send(&mut self, to: usize, message: &Message) -> Result<(), Report> {
    let stream = self.stream_for(to)?;
    write_frame(stream, message).wrap_err_with(|| format!("When sending to rank {to}"))
  }

  fn recv(&mut self, from: usize) -> Result<Message, Report> {
    let stream = self.stream_for(from)?;
    read_frame(stream).wrap_err_with(|| format!("When receiving from rank {from}"))
  }
}

/// In-memory transport over channels; `channel_world` wires up a full world
/// for tests.
pub struct ChannelTransport {
  rank: usize,
  world: usize,
  senders: Vec<crossbeam_channel::Sender<(usize, Message)>>,
  inbox: crossbeam_channel::Receiver<(usize, Message)>,
  stash: VecDeque<(usize, Message)>,
}

pub fn channel_world(world: usize) -> Vec<ChannelTransport> {
  let channels: Vec<_> = (0..world).map(|_| crossbeam_channel::unbounded()).collect();
  let senders: Vec<_> = channels.iter().map(|(s, _r)| s.clone()).collect();
  channels
    .into_iter()
    .enumerate()
    .map(|(rank, (_s, inbox))| ChannelTransport {
      rank,
      world,
      senders: senders.clone(),
      inbox,
      stash: VecDeque::new(),
    })
    .collect()
}

impl Transport for ChannelTransport {
  fn rank(&self) -> usize {
    self.rank
  }

  fn world_size(&self) -> usize {
    self.world
  }

  fn send(&mut self, to: usize, message: &Message) -> Result<(), Report> {
    self
      .senders
      .get(to)
      .ok_or_else(|| eyre!("no rank {to} in a world of {}", self.world))?
      .send((self.rank, message.clone()))
      .map_err(|_| eyre!("rank {to} is gone"))
  }

  fn recv(&mut self, from: usize) -> Result<Message, Report> {
    if let Some(pos) = self.stash.iter().position(|(sender, _)| *sender == from) {
      return Ok(self.stash.remove(pos).map(|(_, m)| m).unwrap_or_else(|| unreachable!()));
    }
    loop {
      let (sender, message) = self
        .inbox
        .recv()
        .map_err(|_| eyre!("world shut down while rank {} awaited rank {from}", self.rank))?;
      if sender == from {
        return Ok(message);
      }
      self.stash.push_back((sender, message));
    }
  }
}

/// Builds the transport this process should use, from the environment the
/// runner prepared. Unset or single-process environments get the local
/// transport.
pub fn transport_from_env() -> Result<Box<dyn Transport>, Report> {
  let rank = env_usize(&["TILEALIGN_RANK", "OMPI_COMM_WORLD_RANK", "PMI_RANK"])?;
  let world = env_usize(&["TILEALIGN_WORLD_SIZE", "OMPI_COMM_WORLD_SIZE", "PMI_SIZE"])?;

  match (rank, world) {
    (_, None | Some(0 | 1)) => Ok(Box::new(LocalTransport)),
    (rank, Some(world)) => {
      let rank = rank.ok_or_else(|| eyre!("world size is {world} but no rank is set in the environment"))?;
      let coord = std::env::var("TILEALIGN_COORD")
        .map_err(|_| eyre!("TILEALIGN_COORD must name the coordinator host:port when running {world} processes"))?;
      Ok(Box::new(TcpTransport::connect(rank, world, &coord)?))
    }
  }
}

fn env_usize(names: &[&str]) -> Result<Option<usize>, Report> {
  for name in names {
    if let Ok(value) = std::env::var(name) {
      let parsed = value
        .parse::<usize>()
        .wrap_err_with(|| format!("When parsing environment variable {name}={value}"))?;
      return Ok(Some(parsed));
    }
  }
  Ok(None)
}

/// Host identity used for grouping processes into per-host leaders.
pub fn host_name() -> String {
  if let Ok(name) = std::env::var("HOSTNAME") {
    if !name.is_empty() {
      return name;
    }
  }
  if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
    let name = name.trim();
    if !name.is_empty() {
      return name.to_owned();
    }
  }
  "localhost".to_owned()
}
