use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use devsync::console::KeySource;

/// Key source replaying a fixed script, one key per read. Once the script
/// is exhausted every read times out.
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    keys: VecDeque<char>,
    /// Pause before each scripted key.
    delay: Duration,
}

impl ScriptedKeys {
    pub fn new(keys: &[char]) -> Self {
        Self {
            keys: keys.iter().copied().collect(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl KeySource for ScriptedKeys {
    fn read_key(&mut self, timeout: Duration) -> io::Result<Option<char>> {
        match self.keys.pop_front() {
            Some(key) => {
                std::thread::sleep(self.delay);
                Ok(Some(key))
            }
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}
