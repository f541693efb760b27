//! Chronologically sortable child keys for `push`.
//!
//! A key is 20 characters: 8 encode the creation time in milliseconds, 12 are
//! random. Keys created in the same millisecond reuse the random part
//! incremented by one, so lexicographic order is creation order.

use rand_core::RngCore;

const PUSH_CHARS: &[u8; 64] =
  b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_LEN: usize = 8;
const RAND_LEN: usize = 12;

#[derive(Debug, Default)]
pub struct PushIds {
  last_ms:   i64,
  last_rand: [u8; RAND_LEN],
}

impl PushIds {
  pub fn next(&mut self, now_ms: i64, rng: &mut impl RngCore) -> String {
    // A clock that steps backwards must not reorder keys.
    let now_ms = now_ms.max(self.last_ms);
    let repeat = now_ms == self.last_ms;
    self.last_ms = now_ms;

    if repeat {
      self.increment();
    } else {
      rng.fill_bytes(&mut self.last_rand);
      for b in &mut self.last_rand {
        *b &= 63;
      }
    }

    let mut key = [0u8; TIME_LEN + RAND_LEN];
    let mut t = now_ms.max(0);
    for slot in key[..TIME_LEN].iter_mut().rev() {
      *slot = PUSH_CHARS[(t % 64) as usize];
      t /= 64;
    }
    for (slot, r) in key[TIME_LEN..].iter_mut().zip(self.last_rand) {
      *slot = PUSH_CHARS[usize::from(r)];
    }
    key.iter().map(|&b| char::from(b)).collect()
  }

  fn increment(&mut self) {
    for r in self.last_rand.iter_mut().rev() {
      if *r == 63 {
        *r = 0;
      } else {
        *r += 1;
        return;
      }
    }
  }
}
