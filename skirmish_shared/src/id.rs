//! Identifier generation.

use rand::{distributions::Alphanumeric, rngs::StdRng, Rng, SeedableRng};

use crate::entity::EntityId;

const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Source of fresh entity ids.
pub trait IdGenerator: Send {
    /// Returns an id never returned before by this generator.
    fn generate(&mut self) -> EntityId;
}

/// Short, URL-safe ids: a random prefix plus a base-62 sequence number.
///
/// The sequence suffix makes ids unique for the generator's lifetime; the
/// random prefix keeps them unguessable across restarts.
pub struct ShortIdGenerator {
    rng: StdRng,
    seq: u64,
    prefix_len: usize,
}

impl ShortIdGenerator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            seq: 0,
            prefix_len: 6,
        }
    }
}

impl Default for ShortIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for ShortIdGenerator {
    fn generate(&mut self) -> EntityId {
        let mut id: String = (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(self.prefix_len)
            .map(char::from)
            .collect();
        id.push_str(&base62(self.seq));
        self.seq += 1;
        EntityId(id)
    }
}

fn base62(mut n: u64) -> String {
    let mut digits = Vec::new();
    loop {
        digits.push(BASE62[(n % 62) as usize]);
        n /= 62;
        if n == 0 {
            break;
        }
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Predictable ids (`p1`, `p2`, ...).
#[derive(Debug, Clone)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: u64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&mut self) -> EntityId {
        let id = EntityId(format!("{}{}", self.prefix, self.next));
        self.next += 1;
        id
    }
}
