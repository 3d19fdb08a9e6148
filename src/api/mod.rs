use std::convert::Infallible;

use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use futures::Stream;
use serde::Serialize;
use snafu::ResultExt as _;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::likes::{CooldownStatus, LikeCounter, LikeOutcome};
use crate::store::LikeStore;

mod error;
mod state;
mod visitor;

pub use error::*;
pub use state::App;
pub use visitor::{identify, VISITOR_COOKIE};

/// The whole site: the like counter API, the static site as a fallback, and request tracing.
pub fn app<S: LikeStore>(counter: LikeCounter<S>, config: &Config) -> Router {
    let mut app = router(counter);

    if let Some(dir) = &config.static_dir {
        // unknown paths get the index page so that client-side routes survive a reload
        let site = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
        app = app.fallback_service(site);
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors(config)),
    )
}

fn cors(config: &Config) -> CorsLayer {
    let Some(origin) = &config.allowed_origin else {
        return CorsLayer::new();
    };

    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_credentials(true),
        Err(error) => {
            tracing::warn!(%error, %origin, "ignoring invalid allowed origin");
            CorsLayer::new()
        }
    }
}

/// Routes of the like counter, mounted under `/api/likes`.
pub fn router<S: LikeStore>(counter: LikeCounter<S>) -> Router {
    Router::new()
        .route("/api/likes", get(likes::count::<S>).post(likes::like::<S>))
        .route("/api/likes/cooldown", get(likes::cooldown::<S>))
        .route("/api/likes/live", get(likes::live::<S>))
        .with_state(App::new(counter))
}

pub mod likes {
    use super::*;

    #[derive(Debug, Serialize)]
    pub struct Count {
        pub count: u64,
    }

    /// Shown to the visitor once their like went through.
    pub const THANKS: &str = "Merci pour votre soutien ! 💖";

    /// Prefix of the message shown while the cooldown is running, followed by the countdown.
    pub const PLEASE_WAIT: &str = "Veuillez patienter encore";

    #[derive(Debug, Serialize)]
    #[serde(tag = "status", rename_all = "snake_case")]
    pub enum LikeResponse {
        Accepted {
            count: u64,
            message: String,
        },
        Rejected {
            reason: &'static str,
            message: String,
            #[serde(flatten)]
            cooldown: CooldownStatus,
        },
    }

    impl From<LikeOutcome> for LikeResponse {
        fn from(outcome: LikeOutcome) -> Self {
            match outcome {
                LikeOutcome::Accepted { count } => Self::Accepted {
                    count,
                    message: THANKS.to_string(),
                },
                LikeOutcome::Rejected { cooldown } => Self::Rejected {
                    reason: "cooldown_active",
                    message: match cooldown.countdown() {
                        Some(remaining) => format!("{PLEASE_WAIT} {remaining}"),
                        None => PLEASE_WAIT.to_string(),
                    },
                    cooldown,
                },
            }
        }
    }

    pub async fn count<S: LikeStore>(State(app): State<App<S>>) -> Result<Json<Count>> {
        let count = app.count().await.context(UnavailableSnafu)?;
        Ok(Json(Count { count }))
    }

    pub async fn like<S: LikeStore>(
        State(app): State<App<S>>, jar: CookieJar,
    ) -> Result<(CookieJar, Json<LikeResponse>)> {
        let (jar, visitor) = identify(jar);
        let outcome = app.attempt_like(&visitor).await.context(UnavailableSnafu)?;

        Ok((jar, Json(outcome.into())))
    }

    pub async fn cooldown<S: LikeStore>(
        State(app): State<App<S>>, jar: CookieJar,
    ) -> Result<(CookieJar, Json<CooldownStatus>)> {
        let (jar, visitor) = identify(jar);
        let status = app.cooldown_status(&visitor).await.context(UnavailableSnafu)?;

        Ok((jar, Json(status)))
    }

    /// Server-sent events carrying the live count. The first event is the current count.
    pub async fn live<S: LikeStore>(
        State(app): State<App<S>>,
    ) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
        let subscription = app.subscribe().await.context(UnavailableSnafu)?;

        let events = futures::stream::unfold(subscription, |mut subscription| async move {
            let count = subscription.next().await?;
            let data = serde_json::json!({ "count": count }).to_string();
            let event = Event::default().event("count").data(data);

            Some((Ok(event), subscription))
        });

        Ok(Sse::new(events).keep_alive(KeepAlive::default()))
    }
}
