//! Elo arithmetic.

/// New ratings for the winner and loser of one match, rounded to whole
/// points.
pub fn calculate_elo(winner_elo: f64, loser_elo: f64, k: f64) -> (f64, f64) {
    let prob_winner = 1.0 / (1.0 + 10f64.powf((loser_elo - winner_elo) / 400.0));
    let prob_loser = 1.0 - prob_winner;

    let new_winner_elo = winner_elo + k * (1.0 - prob_winner);
    let new_loser_elo = loser_elo + k * (0.0 - prob_loser);

    (new_winner_elo.round(), new_loser_elo.round())
}
