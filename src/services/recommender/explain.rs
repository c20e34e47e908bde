//! Human-readable justification of a recommendation.

use ndarray::Array2;

use crate::models::MovieInfo;

/// Minimum content similarity for a favorite to be cited
pub const SIMILARITY_THRESHOLD: f32 = 0.3;

/// Returned when no favorite is similar enough to the target
pub const COLLABORATIVE_EXPLANATION: &str =
    "This movie is recommended based on the shared preferences of users with similar taste.";

/// The favorite most similar to `target`, if any exceeds the threshold
pub fn closest_favorite(
    similarity: &Array2<f32>,
    target: usize,
    favorites: &[(usize, f32)],
) -> Option<(usize, f32)> {
    favorites
        .iter()
        .filter(|&&(_, weight)| weight > 0.0)
        .map(|&(favorite, _)| (favorite, similarity[[target, favorite]]))
        .filter(|&(_, sim)| sim > SIMILARITY_THRESHOLD)
        .fold(None, |best: Option<(usize, f32)>, candidate| match best {
            Some(b) if b.1 >= candidate.1 => Some(b),
            _ => Some(candidate),
        })
}

/// Genres of `target` that `favorite` also has, in the target's order
pub fn shared_genres<'a>(target: &'a MovieInfo, favorite: &MovieInfo) -> Vec<&'a str> {
    target
        .genres
        .iter()
        .filter(|g| favorite.genres.contains(g))
        .map(String::as_str)
        .collect()
}

/// Sentence citing both titles and their common genres
pub fn compose(target: &MovieInfo, favorite: &MovieInfo) -> String {
    let mut text = format!(
        "'{}' is recommended because it is similar to '{}', which you liked.",
        target.title, favorite.title
    );

    let genres = shared_genres(target, favorite);
    if !genres.is_empty() {
        text.push_str(&format!(" They share genres: {}.", genres.join(", ")));
    } else if let Some(tags) = target.top_tags.as_deref() {
        text.push_str(&format!(" It is known for: {}.", tags));
    }
    text
}
