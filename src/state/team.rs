//! The four fixed team colors, per-round exclusion sets and the turn rotation.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// One of the four fixed team colors.
///
/// The declaration order is the rotation order: Red, Blue, Green, Yellow.
/// On the wire teams use their Portuguese display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    /// Red team, first in the rotation.
    #[serde(rename = "Vermelho")]
    Red,
    /// Blue team.
    #[serde(rename = "Azul")]
    Blue,
    /// Green team.
    #[serde(rename = "Verde")]
    Green,
    /// Yellow team, last in the rotation.
    #[serde(rename = "Amarelo")]
    Yellow,
}

impl Team {
    /// Every team in rotation order.
    pub const ALL: [Team; 4] = [Team::Red, Team::Blue, Team::Green, Team::Yellow];

    /// Position of the team inside [`Team::ALL`].
    pub fn index(self) -> usize {
        match self {
            Team::Red => 0,
            Team::Blue => 1,
            Team::Green => 2,
            Team::Yellow => 3,
        }
    }

    /// Display name used by the catalog and score services.
    pub fn display_name(self) -> &'static str {
        match self {
            Team::Red => "Vermelho",
            Team::Blue => "Azul",
            Team::Green => "Verde",
            Team::Yellow => "Amarelo",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Error returned when a team name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown team `{0}`")]
pub struct UnknownTeam(pub String);

impl FromStr for Team {
    type Err = UnknownTeam;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "red" | "vermelho" => Ok(Team::Red),
            "blue" | "azul" => Ok(Team::Blue),
            "green" | "verde" => Ok(Team::Green),
            "yellow" | "amarelo" => Ok(Team::Yellow),
            _ => Err(UnknownTeam(value.to_string())),
        }
    }
}

/// Ordered set of teams.
///
/// Serialized as a plain list in rotation order so snapshots round-trip directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamSet(BTreeSet<Team>);

impl TeamSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a team, returning `false` when it was already present.
    pub fn insert(&mut self, team: Team) -> bool {
        self.0.insert(team)
    }

    /// Whether the team is part of the set.
    pub fn contains(&self, team: Team) -> bool {
        self.0.contains(&team)
    }

    /// Remove every team.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Number of teams in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set holds no team.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in rotation order.
    pub fn iter(&self) -> impl Iterator<Item = Team> + '_ {
        self.0.iter().copied()
    }

    /// Whether every team of `other` is also in `self`.
    pub fn covers(&self, other: &TeamSet) -> bool {
        other.iter().all(|team| self.contains(team))
    }

    /// Teams as a list in rotation order.
    pub fn to_vec(&self) -> Vec<Team> {
        self.iter().collect()
    }
}

impl FromIterator<Team> for TeamSet {
    fn from_iter<I: IntoIterator<Item = Team>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Teams of the fixed rotation that are in none of the `excluded` sets.
pub fn eligible_teams(excluded: &[&TeamSet]) -> TeamSet {
    Team::ALL
        .into_iter()
        .filter(|team| excluded.iter().all(|set| !set.contains(*team)))
        .collect()
}

/// Cyclic pointer into the fixed rotation.
///
/// The pointer only moves when a new round starts; the very first round starts
/// on the first team of the rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResolver {
    index: Option<usize>,
}

impl TurnResolver {
    /// Resolver that has not started any round yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Team whose turn it currently is, if a round has started.
    pub fn current(&self) -> Option<Team> {
        self.index.map(|index| Team::ALL[index % Team::ALL.len()])
    }

    /// Move to the next team for a new round and return it.
    pub fn advance(&mut self) -> Team {
        let next = match self.index {
            None => 0,
            Some(index) => (index + 1) % Team::ALL.len(),
        };
        self.index = Some(next);
        Team::ALL[next]
    }

    /// Forget the rotation so the next round starts on the first team again.
    pub fn reset(&mut self) {
        self.index = None;
    }
}

/// Points of every team. Teams missing from the source count as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Team, i32>", into = "BTreeMap<Team, i32>")]
pub struct ScoreBoard(BTreeMap<Team, i32>);

impl Default for ScoreBoard {
    fn default() -> Self {
        Self(Team::ALL.into_iter().map(|team| (team, 0)).collect())
    }
}

impl ScoreBoard {
    /// Points of `team`.
    pub fn get(&self, team: Team) -> i32 {
        self.0.get(&team).copied().unwrap_or(0)
    }

    /// Overwrite the points of `team`.
    pub fn set(&mut self, team: Team, points: i32) {
        self.0.insert(team, points);
    }

    /// Add `delta` to the points of `team` and return the new value.
    pub fn add(&mut self, team: Team, delta: i32) -> i32 {
        let points = self.0.entry(team).or_insert(0);
        *points = points.saturating_add(delta);
        *points
    }

    /// Teams and points in rotation order.
    pub fn iter(&self) -> impl Iterator<Item = (Team, i32)> + '_ {
        self.0.iter().map(|(team, points)| (*team, *points))
    }
}

impl From<BTreeMap<Team, i32>> for ScoreBoard {
    fn from(value: BTreeMap<Team, i32>) -> Self {
        let mut board = Self::default();
        board.0.extend(value);
        board
    }
}

impl From<ScoreBoard> for BTreeMap<Team, i32> {
    fn from(value: ScoreBoard) -> Self {
        value.0
    }
}
