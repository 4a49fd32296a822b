//! Byte layout of everything that crosses a transport.
//!
//! A task record is 56 bytes, little-endian, fields in this order:
//!
//! | offset | field              | type     |
//! |--------|--------------------|----------|
//! | 0      | `id`               | u32      |
//! | 4      | `generation`       | i32      |
//! | 8      | `kind`             | i32      |
//! | 12     | `seed`             | u32      |
//! | 16     | `output`           | u32      |
//! | 20     | `num_dependencies` | i32      |
//! | 24     | `dependencies`     | [u32; 4] |
//! | 40     | `masks`            | [u32; 4] |
//!
//! A dispatch frame is exactly one record. The termination signal is a
//! record whose generation is `-1`. Replies are tagged: a child count is
//! `0x01` followed by an i32, a batch is `0x02` followed by whole records.

use thiserror::Error;

use crate::runtime::task::{Dependencies, Dispatch, MAX_DEPENDENCIES, Task, TaskKind};

pub const RECORD_LEN: usize = 56;

const SENTINEL_GENERATION: i32 = -1;
const TAG_COUNT: u8 = 0x01;
const TAG_BATCH: u8 = 0x02;
const COUNT_FRAME_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("task record must be {RECORD_LEN} bytes, got {0}")]
    RecordLength(usize),

    #[error("batch payload of {0} bytes is not a whole number of records")]
    BatchLength(usize),

    #[error("count frame must be {COUNT_FRAME_LEN} bytes, got {0}")]
    CountLength(usize),

    #[error("invalid generation {0}")]
    Generation(i32),

    #[error("generation {0} does not fit the wire field")]
    GenerationOverflow(u32),

    #[error("num_dependencies {0} outside 0..={MAX_DEPENDENCIES}")]
    DependencyCount(i32),

    #[error("negative child count {0}")]
    NegativeCount(i32),

    #[error("child count {0} does not fit the wire field")]
    CountOverflow(usize),

    #[error("termination record inside a reply batch")]
    SentinelInBatch,

    #[error("unknown reply tag {0:#04x}")]
    UnknownTag(u8),

    #[error("empty reply frame")]
    EmptyFrame,
}

/// One leg of a worker's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyLeg {
    /// How many children follow. Zero means no batch leg is sent.
    Count(u32),
    Batch(Vec<Task>),
}

/// The record exactly as laid out on the wire.
#[derive(Debug, Clone, Copy, Default)]
struct RawRecord {
    id: u32,
    generation: i32,
    kind: i32,
    seed: u32,
    output: u32,
    num_dependencies: i32,
    dependencies: [u32; MAX_DEPENDENCIES],
    masks: [u32; MAX_DEPENDENCIES],
}

impl RawRecord {
    fn sentinel() -> Self {
        Self {
            generation: SENTINEL_GENERATION,
            ..Self::default()
        }
    }

    fn from_task(task: &Task) -> Result<Self, WireError> {
        let generation = i32::try_from(task.generation)
            .map_err(|_| WireError::GenerationOverflow(task.generation))?;
        let (dependencies, masks) = task.dependencies.slots();
        Ok(Self {
            id: task.id,
            generation,
            kind: task.kind.0,
            seed: task.seed,
            output: task.output,
            num_dependencies: task.dependencies.len() as i32,
            dependencies: *dependencies,
            masks: *masks,
        })
    }

    fn into_task(self) -> Result<Task, WireError> {
        if self.generation == SENTINEL_GENERATION {
            return Err(WireError::SentinelInBatch);
        }
        let generation =
            u32::try_from(self.generation).map_err(|_| WireError::Generation(self.generation))?;
        let len = usize::try_from(self.num_dependencies)
            .map_err(|_| WireError::DependencyCount(self.num_dependencies))?;
        let dependencies = Dependencies::from_slots(self.dependencies, self.masks, len)
            .map_err(|_| WireError::DependencyCount(self.num_dependencies))?;
        Ok(Task {
            id: self.id,
            generation,
            kind: TaskKind(self.kind),
            seed: self.seed,
            output: self.output,
            dependencies,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&self.generation.to_le_bytes());
        out.extend_from_slice(&self.kind.to_le_bytes());
        out.extend_from_slice(&self.seed.to_le_bytes());
        out.extend_from_slice(&self.output.to_le_bytes());
        out.extend_from_slice(&self.num_dependencies.to_le_bytes());
        for dependency in self.dependencies {
            out.extend_from_slice(&dependency.to_le_bytes());
        }
        for mask in self.masks {
            out.extend_from_slice(&mask.to_le_bytes());
        }
    }

    fn read(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != RECORD_LEN {
            return Err(WireError::RecordLength(bytes.len()));
        }
        let mut dependencies = [0u32; MAX_DEPENDENCIES];
        let mut masks = [0u32; MAX_DEPENDENCIES];
        for slot in 0..MAX_DEPENDENCIES {
            dependencies[slot] = read_u32(bytes, 24 + slot * 4);
            masks[slot] = read_u32(bytes, 40 + slot * 4);
        }
        Ok(Self {
            id: read_u32(bytes, 0),
            generation: read_i32(bytes, 4),
            kind: read_i32(bytes, 8),
            seed: read_u32(bytes, 12),
            output: read_u32(bytes, 16),
            num_dependencies: read_i32(bytes, 20),
            dependencies,
            masks,
        })
    }
}

// Callers check lengths before reading.
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word)
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    read_u32(bytes, at) as i32
}

pub fn encode_task(task: &Task, out: &mut Vec<u8>) -> Result<(), WireError> {
    RawRecord::from_task(task)?.write(out);
    Ok(())
}

/// Decodes a record that must describe real work.
pub fn decode_task(bytes: &[u8]) -> Result<Task, WireError> {
    RawRecord::read(bytes)?.into_task()
}

pub fn encode_dispatch(dispatch: &Dispatch) -> Result<Vec<u8>, WireError> {
    let record = match dispatch {
        Dispatch::Run(task) => RawRecord::from_task(task)?,
        Dispatch::Terminate => RawRecord::sentinel(),
    };
    let mut out = Vec::with_capacity(RECORD_LEN);
    record.write(&mut out);
    Ok(out)
}

pub fn decode_dispatch(bytes: &[u8]) -> Result<Dispatch, WireError> {
    let record = RawRecord::read(bytes)?;
    if record.generation == SENTINEL_GENERATION {
        return Ok(Dispatch::Terminate);
    }
    record.into_task().map(Dispatch::Run)
}

pub fn encode_reply(leg: &ReplyLeg) -> Result<Vec<u8>, WireError> {
    match leg {
        ReplyLeg::Count(count) => {
            let count =
                i32::try_from(*count).map_err(|_| WireError::CountOverflow(*count as usize))?;
            let mut out = Vec::with_capacity(COUNT_FRAME_LEN);
            out.push(TAG_COUNT);
            out.extend_from_slice(&count.to_le_bytes());
            Ok(out)
        }
        ReplyLeg::Batch(tasks) => {
            let mut out = Vec::with_capacity(1 + tasks.len() * RECORD_LEN);
            out.push(TAG_BATCH);
            for task in tasks {
                encode_task(task, &mut out)?;
            }
            Ok(out)
        }
    }
}

pub fn decode_reply(bytes: &[u8]) -> Result<ReplyLeg, WireError> {
    let (&tag, body) = bytes.split_first().ok_or(WireError::EmptyFrame)?;
    match tag {
        TAG_COUNT => {
            if bytes.len() != COUNT_FRAME_LEN {
                return Err(WireError::CountLength(bytes.len()));
            }
            let count = read_i32(body, 0);
            u32::try_from(count)
                .map(ReplyLeg::Count)
                .map_err(|_| WireError::NegativeCount(count))
        }
        TAG_BATCH => {
            if body.len() % RECORD_LEN != 0 {
                return Err(WireError::BatchLength(body.len()));
            }
            body.chunks_exact(RECORD_LEN)
                .map(decode_task)
                .collect::<Result<Vec<_>, _>>()
                .map(ReplyLeg::Batch)
        }
        other => Err(WireError::UnknownTag(other)),
    }
}
