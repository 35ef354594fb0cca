use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult};

/// Session key populated by the identity layer in front of this service.
pub const USER_ID: &str = "user_id";

/// The black-box "who is this caller" check. Everything past this point
/// trusts the returned id; credential issuance lives elsewhere.
pub async fn current_user_id(session: &Session) -> AppResult<Uuid> {
    let Some(user_id) = session.get::<String>(USER_ID).await? else {
        return Err(AppError::Unauthenticated);
    };

    Uuid::parse_str(&user_id).map_err(|_| AppError::Unauthenticated)
}
