use rand::Rng;
use rand::seq::SliceRandom;

use crate::types::{Location, Player};

/// Role label assigned to the spy.
pub const SPY_ROLE: &str = "Spy";

/// Placeholder shown to the spy instead of the real location name.
pub const HIDDEN_LOCATION: &str = "???";

/// One player's secret hand for a round.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub player_id: String,
    pub role: String,
    pub is_spy: bool,
    /// The location name as this player is allowed to see it.
    pub location: String,
}

/// The full outcome of dealing a round.
#[derive(Debug, Clone)]
pub struct Deal {
    pub location: Location,
    pub spy_id: String,
    pub assignments: Vec<Assignment>,
}

/// Deals a round: one location drawn uniformly from the catalog, one player
/// drawn uniformly as the spy, the location's roles shuffled (Fisher-Yates)
/// and handed out in roster order, wrapping around when there are more
/// players than roles.
///
/// `players` and `catalog` must both be non-empty.
pub fn assign<R: Rng + ?Sized>(rng: &mut R, players: &[Player], catalog: &[Location]) -> Deal {
    let location = catalog[rng.random_range(0..catalog.len())].clone();
    let spy_index = rng.random_range(0..players.len());

    let mut roles = location.roles.clone();
    roles.shuffle(rng);

    let assignments = players
        .iter()
        .enumerate()
        .map(|(i, player)| {
            let is_spy = i == spy_index;
            Assignment {
                player_id: player.id.clone(),
                role: if is_spy {
                    SPY_ROLE.to_string()
                } else {
                    roles[i % roles.len()].clone()
                },
                is_spy,
                location: if is_spy {
                    HIDDEN_LOCATION.to_string()
                } else {
                    location.name.clone()
                },
            }
        })
        .collect();

    Deal {
        spy_id: players[spy_index].id.clone(),
        location,
        assignments,
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn players(n: usize) -> Vec<Player> {
        (0..n)
            .map(|i| Player::new(format!("conn-{i}"), format!("player-{i}"), i == 0))
            .collect()
    }

    fn catalog() -> Vec<Location> {
        vec![
            Location {
                name: "Beach".to_string(),
                roles: vec!["Lifeguard".to_string(), "Surfer".to_string()],
            },
            Location {
                name: "Casino".to_string(),
                roles: vec!["Dealer".to_string(), "Bouncer".to_string(), "Gambler".to_string()],
            },
        ]
    }

    #[test]
    fn exactly_one_spy() {
        let mut rng = StdRng::seed_from_u64(7);
        let players = players(5);

        let deal = assign(&mut rng, &players, &catalog());

        let spies: Vec<_> = deal.assignments.iter().filter(|a| a.is_spy).collect();
        assert_eq!(spies.len(), 1);
        assert_eq!(spies[0].player_id, deal.spy_id);
        assert_eq!(spies[0].role, SPY_ROLE);
        assert!(players.iter().any(|p| p.id == deal.spy_id));
    }

    #[test]
    fn non_spy_roles_come_from_the_location() {
        let mut rng = StdRng::seed_from_u64(42);
        let players = players(6);

        let deal = assign(&mut rng, &players, &catalog());

        // More players than roles: repeats are fine, inventions are not.
        for a in deal.assignments.iter().filter(|a| !a.is_spy) {
            assert!(
                deal.location.roles.contains(&a.role),
                "role {:?} not in {:?}",
                a.role,
                deal.location.roles
            );
            assert_eq!(a.location, deal.location.name);
        }
    }

    #[test]
    fn spy_never_sees_the_real_location() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let players = players(4);
            let deal = assign(&mut rng, &players, &catalog());
            let spy = deal.assignments.iter().find(|a| a.is_spy).unwrap();
            assert_eq!(spy.location, HIDDEN_LOCATION);
        }
    }

    #[test]
    fn solo_player_is_the_spy() {
        let mut rng = StdRng::seed_from_u64(1);
        let players = players(1);
        let deal = assign(&mut rng, &players, &catalog());
        assert_eq!(deal.assignments.len(), 1);
        assert!(deal.assignments[0].is_spy);
        assert_eq!(deal.spy_id, players[0].id);
    }
}
