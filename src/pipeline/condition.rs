// Bar-conditional trigger gates, written "k:n" on the wire.
// "k:n" fires when (bar mod n) == k - 1, so "2:4" plays on the second bar of every four.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::shared::BARS_PER_CYCLE;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepCondition {
    hit: u8,   // k, 1-based
    cycle: u8, // n
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionParseError {
    #[error("condition '{0}' is not of the form k:n")]
    Malformed(String),

    #[error("condition {hit}:{cycle} is out of range (need 1 <= k <= n <= {max})", max = BARS_PER_CYCLE)]
    OutOfRange { hit: u8, cycle: u8 },
}

impl StepCondition {
    pub const ALWAYS: StepCondition = StepCondition { hit: 1, cycle: 1 };

    pub fn new(hit: u8, cycle: u8) -> Result<Self, ConditionParseError> {
        if hit == 0 || cycle == 0 || hit > cycle || cycle > BARS_PER_CYCLE {
            return Err(ConditionParseError::OutOfRange { hit, cycle });
        }
        Ok(Self { hit, cycle })
    }

    pub fn hit(self) -> u8 {
        self.hit
    }

    pub fn cycle(self) -> u8 {
        self.cycle
    }

    pub fn fires_on(self, bar: u32) -> bool {
        bar % self.cycle as u32 == (self.hit - 1) as u32
    }

    // The ten conditions a user can pick from, in menu order
    pub fn choices() -> impl Iterator<Item = StepCondition> {
        (1..=BARS_PER_CYCLE).flat_map(|n| (1..=n).map(move |k| StepCondition { hit: k, cycle: n }))
    }
}

impl Default for StepCondition {
    fn default() -> Self {
        Self::ALWAYS
    }
}

impl fmt::Display for StepCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hit, self.cycle)
    }
}

impl FromStr for StepCondition {
    type Err = ConditionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ConditionParseError::Malformed(s.to_string());
        let (k, n) = s.trim().split_once(':').ok_or_else(malformed)?;
        let hit = k.trim().parse::<u8>().map_err(|_| malformed())?;
        let cycle = n.trim().parse::<u8>().map_err(|_| malformed())?;
        Self::new(hit, cycle)
    }
}

impl TryFrom<String> for StepCondition {
    type Error = ConditionParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<StepCondition> for String {
    fn from(c: StepCondition) -> Self {
        c.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_fires() {
        for bar in 0..64 {
            assert!(StepCondition::ALWAYS.fires_on(bar));
        }
    }

    #[test]
    fn each_condition_fires_once_per_period() {
        for cond in StepCondition::choices() {
            let n = cond.cycle() as u32;
            for start in (0..32).step_by(n as usize) {
                let hits: Vec<u32> = (start..start + n).filter(|&b| cond.fires_on(b)).collect();
                assert_eq!(hits.len(), 1, "{cond} in window {start}");
                assert_eq!(hits[0] % n, cond.hit() as u32 - 1);
            }
            // periodic with period n
            for bar in 0..32 {
                assert_eq!(cond.fires_on(bar), cond.fires_on(bar + n));
            }
        }
    }

    #[test]
    fn there_are_ten_choices() {
        let all: Vec<String> = StepCondition::choices().map(|c| c.to_string()).collect();
        assert_eq!(all, ["1:1", "1:2", "2:2", "1:3", "2:3", "3:3", "1:4", "2:4", "3:4", "4:4"]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("3:2".parse::<StepCondition>().is_err());
        assert!("0:1".parse::<StepCondition>().is_err());
        assert!("1:5".parse::<StepCondition>().is_err());
        assert!("abc".parse::<StepCondition>().is_err());
        assert!("1-2".parse::<StepCondition>().is_err());
        assert_eq!("2:4".parse::<StepCondition>().unwrap(), StepCondition::new(2, 4).unwrap());
    }

    #[test]
    fn serializes_as_string() {
        let c = StepCondition::new(3, 4).unwrap();
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"3:4\"");
        let back: StepCondition = serde_json::from_str("\"3:4\"").unwrap();
        assert_eq!(back, c);
        assert!(serde_json::from_str::<StepCondition>("\"9:9\"").is_err());
    }
}
