//! Product reviews: signed-in customers rate a product, the product page lists
//! the reviews with their authors.

use futures::future::try_join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::limits::{MAX_REVIEW_COMMENT_LEN, MAX_REVIEW_RATING};
use crate::model::*;
use crate::session::Session;
use crate::source::{optional, IdentityProvider, ReviewSource, SourceError};

/// Shown when the author's profile no longer exists.
pub const ANONYMOUS_AUTHOR: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("sign in to write a review")]
    LoginRequired,
    #[error("rating must be between 1 and 5 stars, got {0}")]
    InvalidRating(u8),
    #[error("comment is longer than {max} characters")]
    CommentTooLong { max: usize },
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Post a review as the signed-in user. A blank comment is stored as none.
pub async fn submit_review(
    session: Option<&Session>,
    reviews: &dyn ReviewSource,
    product_id: ProductId,
    rating: u8,
    comment: Option<String>,
) -> Result<Review, ReviewError> {
    let session = session.ok_or(ReviewError::LoginRequired)?;
    if !(1..=MAX_REVIEW_RATING).contains(&rating) {
        return Err(ReviewError::InvalidRating(rating));
    }
    let comment = comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if comment.as_ref().is_some_and(|c| c.chars().count() > MAX_REVIEW_COMMENT_LEN) {
        return Err(ReviewError::CommentTooLong {
            max: MAX_REVIEW_COMMENT_LEN,
        });
    }

    let result = reviews
        .add_review(NewReview {
            product_id,
            user_id: session.user_id(),
            rating,
            comment,
        })
        .await;
    metrics::counter!(
        crate::observability::REVIEWS_SUBMITTED_TOTAL,
        "status" => crate::observability::outcome_label(&result)
    )
    .increment(1);

    let review = result?;
    info!(review = %review.id, product = %product_id, user = %review.user_id, "review submitted");
    Ok(review)
}

/// A review with its author's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewWithAuthor {
    pub review: Review,
    pub author: String,
}

/// Reviews of a product, newest first, joined with author names.
pub async fn load_reviews(
    reviews: &dyn ReviewSource,
    identity: &dyn IdentityProvider,
    product_id: ProductId,
) -> Result<Vec<ReviewWithAuthor>, ReviewError> {
    let listed = reviews.list_reviews(product_id).await?;
    let joined = try_join_all(listed.into_iter().map(|review| async move {
        let author = optional(identity.profile(review.user_id).await)?
            .map(|p| p.name)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string());
        Ok::<_, SourceError>(ReviewWithAuthor { review, author })
    }))
    .await?;
    Ok(joined)
}

/// Mean star rating, or `None` without reviews.
pub fn average_rating(reviews: &[Review]) -> Option<f64> {
    if reviews.is_empty() {
        return None;
    }
    let total: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
    Some(f64::from(total) / reviews.len() as f64)
}
