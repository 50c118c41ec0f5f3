//! Time utility functions

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current timestamp in milliseconds
pub fn now_ms() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}

/// Milliseconds elapsed since `since_ms`, zero if the clock went backwards
pub fn elapsed_ms(since_ms: u64) -> u64 {
  now_ms().saturating_sub(since_ms)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_now_ms() {
    let t1 = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(10));
    let t2 = now_ms();
    assert!(t2 > t1);
  }

  #[test]
  fn test_elapsed_ms_saturates() {
    assert_eq!(elapsed_ms(u64::MAX), 0);
    assert!(elapsed_ms(0) > 0);
  }
}
