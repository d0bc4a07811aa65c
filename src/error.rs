use pathfinding::{OverlayError, RouteError};
use svg_tools::SvgError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NavError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("product '{0}' is not stocked on any shelf")]
    ProductUnavailable(String),

    #[error("no route has been planned")]
    NoActiveSession,

    #[error("store has no layout")]
    NavigationUnavailable,

    #[error("invalid store snapshot: {0}")]
    InvalidSnapshot(#[from] serde_json::Error),

    #[error(transparent)]
    Svg(#[from] SvgError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),
}

impl NavError {
    /// Text shown to the shopper.
    pub fn user_message(&self) -> String {
        match self {
            NavError::Route(RouteError::NoGraph) | NavError::NavigationUnavailable => {
                "Navigation is not available for this store yet.".to_string()
            }
            NavError::Route(RouteError::NotFound) => {
                "No path to this item from where you are.".to_string()
            }
            NavError::ProductUnavailable(query) => format!("Sorry, \"{query}\" is unavailable."),
            NavError::NoActiveSession => "Choose a product first.".to_string(),
            NavError::InvalidSnapshot(_) => "Store data could not be loaded.".to_string(),
            NavError::Svg(_) | NavError::Overlay(_) => "The store map could not be drawn.".to_string(),
        }
    }
}
