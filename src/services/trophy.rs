//! Trophy, league and ELO computation applied once per finished match.
//!
//! Everything here is pure; the finalizer calls [`compute_result`] with the
//! ratings captured when the players joined.

use serde::Serialize;
use utoipa::ToSchema;

use crate::state::participant::PlayerId;

/// Trophies awarded for a win before bonuses.
pub const WIN_BASE: i32 = 30;
/// Trophies removed for a loss before penalties.
pub const LOSS_BASE: i32 = 20;
/// Rating gap from which a win counts as an upset.
pub const UNDERDOG_THRESHOLD: i64 = 200;
/// Extra trophies for beating a much stronger opponent.
pub const UNDERDOG_BONUS: i32 = 10;
/// Extra loss for a favourite beaten by a much weaker opponent.
pub const FAVORITE_PENALTY: i32 = 5;
/// Bonus per consecutive win beyond the first.
pub const STREAK_BONUS: i32 = 5;
/// Upper bound on the streak bonus.
pub const MAX_STREAK_BONUS: i32 = 25;
/// Ratings never drop below this value.
pub const MIN_TROPHIES: u32 = 0;
/// ELO K-factor.
pub const ELO_K_FACTOR: f64 = 32.0;

/// League tiers ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum League {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Champion,
    Legend,
}

impl League {
    /// Stable identifier used on the wire and in storage.
    pub fn id(self) -> &'static str {
        match self {
            League::Bronze => "bronze",
            League::Silver => "silver",
            League::Gold => "gold",
            League::Platinum => "platinum",
            League::Diamond => "diamond",
            League::Champion => "champion",
            League::Legend => "legend",
        }
    }
}

/// League tier for a trophy count.
pub fn league_for(rating: u32) -> League {
    match rating {
        0..=500 => League::Bronze,
        501..=1000 => League::Silver,
        1001..=1500 => League::Gold,
        1501..=2000 => League::Platinum,
        2001..=2500 => League::Diamond,
        2501..=3000 => League::Champion,
        _ => League::Legend,
    }
}

/// Trophy update of one player.
#[derive(Debug, Clone, PartialEq)]
pub struct TrophyChange {
    pub player_id: PlayerId,
    pub previous_rating: u32,
    pub new_rating: u32,
    /// Signed change actually applied.
    pub delta: i32,
    pub new_streak: u32,
    pub previous_league: League,
    pub new_league: League,
    pub promoted: bool,
    pub demoted: bool,
    /// Matchmaking ELO adjustment, informational.
    pub elo_delta: i32,
}

/// Trophy updates of both players of a match.
#[derive(Debug, Clone, PartialEq)]
pub struct TrophyOutcome {
    pub winner: TrophyChange,
    pub loser: TrophyChange,
}

/// Compute trophy changes for a decided match or a draw.
///
/// For a draw `winner`/`loser` are just the two players; nobody gains or loses
/// trophies and both streaks reset.
pub fn compute_result(
    winner: &PlayerId,
    loser: &PlayerId,
    winner_rating: u32,
    loser_rating: u32,
    winner_streak: u32,
    is_draw: bool,
) -> TrophyOutcome {
    if is_draw {
        return TrophyOutcome {
            winner: unchanged(winner, winner_rating),
            loser: unchanged(loser, loser_rating),
        };
    }

    let winner_delta = win_delta(winner_rating, loser_rating, winner_streak);
    let loser_delta = loss_delta(loser_rating, winner_rating);

    let winner_new = apply(winner_rating, winner_delta);
    let loser_new = apply(loser_rating, loser_delta);

    let winner_before = league_for(winner_rating);
    let winner_after = league_for(winner_new);
    let loser_before = league_for(loser_rating);
    let loser_after = league_for(loser_new);

    TrophyOutcome {
        winner: TrophyChange {
            player_id: winner.clone(),
            previous_rating: winner_rating,
            new_rating: winner_new,
            delta: winner_new as i32 - winner_rating as i32,
            new_streak: winner_streak.saturating_add(1),
            previous_league: winner_before,
            new_league: winner_after,
            promoted: winner_after > winner_before,
            demoted: false,
            elo_delta: elo_delta(winner_rating, loser_rating, true),
        },
        loser: TrophyChange {
            player_id: loser.clone(),
            previous_rating: loser_rating,
            new_rating: loser_new,
            delta: loser_new as i32 - loser_rating as i32,
            new_streak: 0,
            previous_league: loser_before,
            new_league: loser_after,
            promoted: false,
            demoted: loser_after < loser_before,
            elo_delta: elo_delta(loser_rating, winner_rating, false),
        },
    }
}

/// ELO adjustment for one player.
pub fn elo_delta(player: u32, opponent: u32, won: bool) -> i32 {
    let expected = 1.0 / (1.0 + 10f64.powf((opponent as f64 - player as f64) / 400.0));
    let actual = if won { 1.0 } else { 0.0 };
    (ELO_K_FACTOR * (actual - expected)).round() as i32
}

fn win_delta(rating: u32, opponent: u32, streak: u32) -> i32 {
    let gap = opponent as i64 - rating as i64;
    let underdog = if gap >= UNDERDOG_THRESHOLD {
        UNDERDOG_BONUS
    } else {
        0
    };
    let streak_bonus = (streak.min(i32::MAX as u32) as i32)
        .saturating_mul(STREAK_BONUS)
        .min(MAX_STREAK_BONUS);
    WIN_BASE + underdog + streak_bonus
}

fn loss_delta(rating: u32, opponent: u32) -> i32 {
    let gap = opponent as i64 - rating as i64;
    let penalty = if gap <= -UNDERDOG_THRESHOLD {
        FAVORITE_PENALTY
    } else {
        0
    };
    -(LOSS_BASE + penalty)
}

fn apply(rating: u32, delta: i32) -> u32 {
    let next = rating as i64 + delta as i64;
    next.clamp(MIN_TROPHIES as i64, u32::MAX as i64) as u32
}

fn unchanged(player: &PlayerId, rating: u32) -> TrophyChange {
    let league = league_for(rating);
    TrophyChange {
        player_id: player.clone(),
        previous_rating: rating,
        new_rating: rating,
        delta: 0,
        new_streak: 0,
        previous_league: league,
        new_league: league,
        promoted: false,
        demoted: false,
        elo_delta: 0,
    }
}
