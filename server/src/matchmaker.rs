//! Queue of players waiting for a match
//!
//! Two requests are compatible when they want the same party size and mode,
//! their regions agree (or either says `any`), and their skill tiers are at
//! most one step apart. A match is formed from the oldest request plus the
//! next requests that are compatible with every member picked so far.

use crate::session::MIN_PLAYERS;
use crate::simulation::{competitive, cooperative};
use log::{debug, info};
use shared::{GameMode, MatchPreferences, PlayerId};
use std::time::{Duration, Instant};

pub const ANY_REGION: &str = "any";
/// Age at which `prune` drops a request.
pub const PRUNE_TIMEOUT: Duration = Duration::from_secs(120);
/// Age at which the periodic sweep evicts a request.
pub const SWEEP_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq)]
pub struct MatchRequest {
    pub player: PlayerId,
    pub name: String,
    pub preferences: MatchPreferences,
    pub enqueued_at: Instant,
}

impl MatchRequest {
    pub fn new(player: PlayerId, name: impl Into<String>, preferences: MatchPreferences, now: Instant) -> Self {
        Self {
            player,
            name: name.into(),
            preferences,
            enqueued_at: now,
        }
    }

    pub fn is_compatible(&self, other: &MatchRequest) -> bool {
        let a = &self.preferences;
        let b = &other.preferences;
        a.party_size == b.party_size
            && a.mode == b.mode
            && (a.region == b.region || a.region == ANY_REGION || b.region == ANY_REGION)
            && (a.skill.rank() - b.skill.rank()).abs() <= 1
    }

    /// Players needed to fill a session for this request.
    pub fn group_size(&self) -> usize {
        let max = match self.preferences.mode {
            GameMode::Cooperative => cooperative::MAX_PLAYERS,
            GameMode::Competitive => competitive::MAX_PLAYERS,
        };
        (self.preferences.party_size as usize).clamp(MIN_PLAYERS, max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchDescriptor {
    pub mode: GameMode,
    pub players: Vec<(PlayerId, String)>,
}

impl MatchDescriptor {
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|(id, _)| *id).collect()
    }
}

#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub matches: Vec<MatchDescriptor>,
    pub evicted: Vec<PlayerId>,
}

#[derive(Debug, Default)]
pub struct Matchmaker {
    queue: Vec<MatchRequest>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a request and returns its 1-based position, or `None` when the
    /// player is already waiting.
    pub fn enqueue(&mut self, request: MatchRequest) -> Option<usize> {
        if self.contains(request.player) {
            return None;
        }
        debug!(
            "Player {} queued for {:?} in region {}",
            request.player, request.preferences.mode, request.preferences.region
        );
        self.queue.push(request);
        Some(self.queue.len())
    }

    pub fn cancel(&mut self, player: PlayerId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|request| request.player != player);
        before != self.queue.len()
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.queue.iter().any(|request| request.player == player)
    }

    pub fn position(&self, player: PlayerId) -> Option<usize> {
        self.queue
            .iter()
            .position(|request| request.player == player)
            .map(|index| index + 1)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Removes and returns the first complete group, if any.
    pub fn find_match(&mut self) -> Option<MatchDescriptor> {
        for anchor in 0..self.queue.len() {
            let needed = self.queue[anchor].group_size();
            let mut group = vec![anchor];

            for candidate in anchor + 1..self.queue.len() {
                if group.len() == needed {
                    break;
                }
                let fits = group
                    .iter()
                    .all(|member| self.queue[*member].is_compatible(&self.queue[candidate]));
                if fits {
                    group.push(candidate);
                }
            }

            if group.len() == needed {
                let mode = self.queue[anchor].preferences.mode;
                let mut players = Vec::with_capacity(needed);
                for index in group.into_iter().rev() {
                    let request = self.queue.remove(index);
                    players.push((request.player, request.name));
                }
                players.reverse();
                info!("Matched {} players for {:?}", players.len(), mode);
                return Some(MatchDescriptor { mode, players });
            }
        }
        None
    }

    /// Evicts requests older than the sweep timeout, then forms every match
    /// the remaining queue allows.
    pub fn sweep(&mut self, now: Instant) -> SweepOutcome {
        let evicted = self.drain_older_than(now, SWEEP_TIMEOUT);
        let mut matches = Vec::new();
        while let Some(found) = self.find_match() {
            matches.push(found);
        }
        SweepOutcome { matches, evicted }
    }

    pub fn prune(&mut self, now: Instant) -> Vec<PlayerId> {
        self.drain_older_than(now, PRUNE_TIMEOUT)
    }

    fn drain_older_than(&mut self, now: Instant, age: Duration) -> Vec<PlayerId> {
        let mut dropped = Vec::new();
        self.queue.retain(|request| {
            let keep = now.saturating_duration_since(request.enqueued_at) < age;
            if !keep {
                dropped.push(request.player);
            }
            keep
        });
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::SkillTier;

    fn prefs(mode: GameMode, skill: SkillTier, region: &str) -> MatchPreferences {
        MatchPreferences {
            party_size: 2,
            skill,
            mode,
            region: region.to_string(),
        }
    }

    fn request(player: PlayerId, preferences: MatchPreferences, now: Instant) -> MatchRequest {
        MatchRequest::new(player, format!("p{}", player), preferences, now)
    }

    #[test]
    fn test_compatibility_rules() {
        let now = Instant::now();
        let base = request(1, prefs(GameMode::Cooperative, SkillTier::Gold, "eu"), now);

        assert!(base.is_compatible(&request(2, prefs(GameMode::Cooperative, SkillTier::Silver, "eu"), now)));
        assert!(base.is_compatible(&request(2, prefs(GameMode::Cooperative, SkillTier::Platinum, "any"), now)));
        assert!(!base.is_compatible(&request(2, prefs(GameMode::Cooperative, SkillTier::Bronze, "eu"), now)));
        assert!(!base.is_compatible(&request(2, prefs(GameMode::Competitive, SkillTier::Gold, "eu"), now)));
        assert!(!base.is_compatible(&request(2, prefs(GameMode::Cooperative, SkillTier::Gold, "na"), now)));

        let mut bigger = prefs(GameMode::Cooperative, SkillTier::Gold, "eu");
        bigger.party_size = 3;
        assert!(!base.is_compatible(&request(2, bigger, now)));
    }

    #[test]
    fn test_duplicate_enqueue_rejected_and_positions_reported() {
        let now = Instant::now();
        let mut matchmaker = Matchmaker::new();
        let p = prefs(GameMode::Competitive, SkillTier::Gold, "eu");

        assert_eq!(matchmaker.enqueue(request(1, p.clone(), now)), Some(1));
        assert_eq!(matchmaker.enqueue(request(1, p.clone(), now)), None);
        assert_eq!(matchmaker.enqueue(request(2, prefs(GameMode::Cooperative, SkillTier::Gold, "eu"), now)), Some(2));
        assert_eq!(matchmaker.position(2), Some(2));

        assert!(matchmaker.cancel(1));
        assert!(!matchmaker.cancel(1));
        assert_eq!(matchmaker.position(2), Some(1));
    }

    #[test]
    fn test_find_match_removes_group_atomically() {
        let now = Instant::now();
        let mut matchmaker = Matchmaker::new();
        matchmaker.enqueue(request(1, prefs(GameMode::Cooperative, SkillTier::Bronze, "eu"), now));
        matchmaker.enqueue(request(2, prefs(GameMode::Cooperative, SkillTier::Diamond, "eu"), now));
        matchmaker.enqueue(request(3, prefs(GameMode::Cooperative, SkillTier::Platinum, "any"), now));

        let found = matchmaker.find_match().unwrap();
        assert_eq!(found.mode, GameMode::Cooperative);
        assert_eq!(found.player_ids(), vec![2, 3]);
        assert_eq!(matchmaker.len(), 1);
        assert!(matchmaker.contains(1));
        assert!(matchmaker.find_match().is_none());
    }

    #[test]
    fn test_group_must_be_pairwise_compatible() {
        let now = Instant::now();
        let mut matchmaker = Matchmaker::new();
        let mut wide = |player, skill| {
            let mut p = prefs(GameMode::Competitive, skill, "eu");
            p.party_size = 3;
            matchmaker.enqueue(request(player, p, now));
        };
        wide(1, SkillTier::Silver);
        wide(2, SkillTier::Gold);
        wide(3, SkillTier::Platinum);
        wide(4, SkillTier::Silver);

        let found = matchmaker.find_match().unwrap();
        assert_eq!(found.player_ids(), vec![1, 2, 4]);
        assert_eq!(matchmaker.position(3), Some(1));
    }

    #[test]
    fn test_group_size_follows_mode_limits() {
        let now = Instant::now();
        let mut p = prefs(GameMode::Cooperative, SkillTier::Gold, "eu");
        p.party_size = 4;
        assert_eq!(request(1, p.clone(), now).group_size(), 2);
        p.mode = GameMode::Competitive;
        assert_eq!(request(1, p.clone(), now).group_size(), 4);
        p.party_size = 1;
        assert_eq!(request(1, p, now).group_size(), 2);
    }

    #[test]
    fn test_sweep_evicts_stale_then_matches() {
        let start = Instant::now();
        let mut matchmaker = Matchmaker::new();
        let p = prefs(GameMode::Competitive, SkillTier::Gold, "eu");
        matchmaker.enqueue(request(1, p.clone(), start));
        matchmaker.enqueue(request(2, prefs(GameMode::Cooperative, SkillTier::Gold, "eu"), start + Duration::from_secs(200)));
        matchmaker.enqueue(request(3, p.clone(), start + Duration::from_secs(250)));
        matchmaker.enqueue(request(4, p, start + Duration::from_secs(260)));

        let outcome = matchmaker.sweep(start + Duration::from_secs(301));
        assert_eq!(outcome.evicted, vec![1]);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].player_ids(), vec![3, 4]);
        assert_eq!(matchmaker.len(), 1);
    }

    #[test]
    fn test_prune_uses_shorter_timeout() {
        let start = Instant::now();
        let mut matchmaker = Matchmaker::new();
        matchmaker.enqueue(request(1, prefs(GameMode::Competitive, SkillTier::Gold, "eu"), start));

        assert!(matchmaker.sweep(start + Duration::from_secs(150)).evicted.is_empty());
        assert_eq!(matchmaker.prune(start + Duration::from_secs(150)), vec![1]);
        assert!(matchmaker.is_empty());
    }
}
