//! ID generation — `{prefix}_{unix-millis}_{random-lowercase-alnum}`.
//!
//! Used by every repository so IDs are globally unique and roughly
//! time-ordered without a central counter.

use rand::Rng;

const RAND_LEN: usize = 8;
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generates `{kind}_{millis}_{random}` IDs for a given entity kind.
#[derive(Debug, Clone, Copy)]
pub struct IdGenerator {
    prefix: &'static str,
}

impl IdGenerator {
    pub const fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }

    pub fn generate(&self) -> String {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let rand_part = random_alnum(RAND_LEN);
        format!("{}_{millis}_{rand_part}", self.prefix)
    }
}

fn random_alnum(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

pub const PROJECT_IDS: IdGenerator = IdGenerator::new("proj");
pub const TASK_IDS: IdGenerator = IdGenerator::new("task");
pub const SESSION_IDS: IdGenerator = IdGenerator::new("sess");
pub const TEAM_MEMBER_IDS: IdGenerator = IdGenerator::new("tm");
pub const MESSAGE_IDS: IdGenerator = IdGenerator::new("msg");
pub const EVENT_IDS: IdGenerator = IdGenerator::new("evt");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_prefixed_id() {
        let id = TASK_IDS.generate();
        assert!(id.starts_with("task_"));
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), RAND_LEN);
    }

    #[test]
    fn ids_are_unique() {
        let a = SESSION_IDS.generate();
        let b = SESSION_IDS.generate();
        assert_ne!(a, b);
    }
}
