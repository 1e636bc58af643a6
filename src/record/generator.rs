use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::error::RecordResult;
use super::record::Record;

/// Seed used by the demo commands when none is given
pub const DEFAULT_SEED: u64 = 12569874;

pub const NAMES: &[&str] = &[
    "Yannis",
    "Christofos",
    "Sofia",
    "Marianna",
    "Vagelis",
    "Maria",
    "Iosif",
    "Dionisis",
    "Konstantina",
    "Theofilos",
    "Giorgos",
    "Dimitris",
];

pub const SURNAMES: &[&str] = &[
    "Ioannidis",
    "Svingos",
    "Karvounari",
    "Rezkalla",
    "Nikolopoulos",
    "Berreta",
    "Koronis",
    "Gaitanis",
    "Oikonomou",
    "Mailis",
    "Michas",
    "Halatsis",
];

pub const CITIES: &[&str] = &[
    "Athens",
    "San Francisco",
    "Los Angeles",
    "Amsterdam",
    "London",
    "New York",
    "Tokyo",
    "Hong Kong",
    "Munich",
    "Miami",
];

/// Deterministic source of demo records.
///
/// Ids are handed out sequentially from 0; the string fields are drawn from
/// fixed lists, so two generators with the same seed yield identical streams.
pub struct RecordGenerator {
    rng: StdRng,
    next_id: i32,
}

impl RecordGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            next_id: 0,
        }
    }

    pub fn next_record(&mut self) -> RecordResult<Record> {
        let id = self.next_id;
        self.next_id += 1;
        Record::new(
            id,
            pick(&mut self.rng, NAMES),
            pick(&mut self.rng, SURNAMES),
            pick(&mut self.rng, CITIES),
        )
    }

    /// Generate `count` records
    pub fn take(&mut self, count: usize) -> RecordResult<Vec<Record>> {
        (0..count).map(|_| self.next_record()).collect()
    }
}

impl Default for RecordGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

fn pick<'a>(rng: &mut StdRng, values: &[&'a str]) -> &'a str {
    values.choose(rng).copied().unwrap_or_default()
}
