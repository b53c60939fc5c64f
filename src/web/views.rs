use axum::extract::Query;
use axum::response::{Redirect, Response};
use tower_sessions::Session;
use tracing::instrument;

use super::csrf::{csrf_matches, csrf_token};
use super::flash;
use super::middleware::Owner;
use super::prelude::*;
use crate::constants::HISTORY_PAGE_SIZE;
use crate::db::store::ComicRecord;
use crate::pipeline::ComicStrip;

#[derive(Deserialize)]
pub(crate) struct ComicForm {
    idea: String,
    csrf_token: String,
}

#[derive(Deserialize)]
pub(crate) struct HistoryQuery {
    page: Option<u64>,
}

#[derive(Clone, Debug)]
pub(crate) struct PanelView {
    pub(crate) image_url: String,
    pub(crate) caption: String,
}

#[derive(Clone, Debug)]
pub(crate) struct ComicView {
    pub(crate) title: String,
    pub(crate) prompt: String,
    pub(crate) panels: Vec<PanelView>,
    pub(crate) dropped_notice: String,
    pub(crate) created_label: String,
}

impl ComicView {
    fn from_record(record: &ComicRecord) -> Self {
        Self {
            title: record.title.clone().unwrap_or_default(),
            prompt: record.prompt.clone(),
            panels: record
                .panels()
                .map(|(image_url, caption)| PanelView {
                    image_url: image_url.to_string(),
                    caption: caption.to_string(),
                })
                .collect(),
            dropped_notice: dropped_notice(&record.dropped_scenes),
            created_label: record.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        }
    }

    fn from_strip(strip: &ComicStrip) -> Self {
        Self {
            title: strip.title.clone().unwrap_or_default(),
            prompt: strip.prompt.clone(),
            panels: strip
                .panels
                .iter()
                .map(|panel| PanelView {
                    image_url: panel.image_url.clone(),
                    caption: panel.caption.clone(),
                })
                .collect(),
            dropped_notice: dropped_notice(&strip.dropped_scenes),
            created_label: Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
        }
    }
}

/// "Scenes 2 and 5 couldn't be drawn ..." or empty when nothing was dropped.
pub(crate) fn dropped_notice(dropped: &[u32]) -> String {
    let numbers: Vec<String> = dropped.iter().map(u32::to_string).collect();
    match numbers.as_slice() {
        [] => String::new(),
        [only] => format!("Scene {only} couldn't be drawn and was left out."),
        [rest @ .., last] => format!(
            "Scenes {} and {last} couldn't be drawn and were left out.",
            rest.join(", ")
        ),
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub(crate) struct HomeTemplate {
    signed_in: bool,
    daily_allowance: i64,
    purchased_balance: i64,
    comic_cost: i64,
    max_idea_chars: usize,
    csrf_token: String,
    has_flash: bool,
    flash_message: String,
    flash_class: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "comic.html")]
pub(crate) struct ComicTemplate {
    comic: ComicView,
    stored: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "history.html")]
pub(crate) struct HistoryTemplate {
    comics: Vec<ComicView>,
    page: u64,
    has_prev: bool,
    has_next: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "credits.html")]
pub(crate) struct CreditsTemplate {
    daily_allowance: i64,
    purchased_balance: i64,
    remaining: i64,
    comic_cost: i64,
    comics_left: i64,
}

/// handles the / GET
pub(crate) async fn home_handler(
    State(state): State<AppState>,
    session: Session,
    owner: Option<Owner>,
) -> Result<HomeTemplate, ComicError> {
    let balance = match &owner {
        Some(Owner(owner)) => Some(
            state
                .coordinator
                .meter()
                .balance(owner, Utc::now().date_naive())
                .await?,
        ),
        None => None,
    };
    let csrf_token = csrf_token(&session).await?;
    let flash = flash::take_flash_message(&session).await?;
    let (has_flash, flash_message, flash_class) = match flash {
        Some(message) => (true, message.text.to_string(), message.class.to_string()),
        None => (false, String::new(), String::new()),
    };
    let config = state.coordinator.config();
    Ok(HomeTemplate {
        signed_in: owner.is_some(),
        daily_allowance: balance.map(|b| b.daily_allowance).unwrap_or_default(),
        purchased_balance: balance.map(|b| b.purchased_balance).unwrap_or_default(),
        comic_cost: config.comic_cost,
        max_idea_chars: config.max_idea_chars,
        csrf_token,
        has_flash,
        flash_message,
        flash_class,
    })
}

/// handles the /comics POST
#[instrument(skip_all, fields(owner = %owner.0))]
pub(crate) async fn create_comic_handler(
    State(state): State<AppState>,
    session: Session,
    owner: Owner,
    Form(form): Form<ComicForm>,
) -> Result<Response, ComicError> {
    if !csrf_matches(&session, &form.csrf_token).await? {
        info!("CSRF token mismatch");
        flash::set_flash(&session, flash::FLASH_SESSION_EXPIRED).await?;
        return Ok(Redirect::to("/").into_response());
    }

    match state.coordinator.run(&form.idea, &owner.0).await {
        Ok(strip) if strip.record_id.is_some() => Ok(Redirect::to("/comics/latest").into_response()),
        // not stored, so the viewer can't re-read it
        Ok(strip) => Ok(ComicTemplate {
            comic: ComicView::from_strip(&strip),
            stored: false,
        }
        .into_response()),
        Err(err) => {
            warn!("Comic generation failed: {err}");
            flash::set_flash(&session, flash::flag_for(&err)).await?;
            Ok(Redirect::to("/").into_response())
        }
    }
}

/// handles the /comics/latest GET
pub(crate) async fn latest_comic_handler(
    State(state): State<AppState>,
    owner: Owner,
) -> Result<Response, ComicError> {
    match state.coordinator.comics().latest_for_owner(&owner.0).await? {
        Some(record) => Ok(ComicTemplate {
            comic: ComicView::from_record(&record),
            stored: true,
        }
        .into_response()),
        None => Ok(Redirect::to("/").into_response()),
    }
}

/// handles the /history GET
pub(crate) async fn history_handler(
    State(state): State<AppState>,
    owner: Owner,
    Query(query): Query<HistoryQuery>,
) -> Result<HistoryTemplate, ComicError> {
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1).saturating_mul(HISTORY_PAGE_SIZE);
    // one extra row tells us whether there is a next page
    let mut records = state
        .coordinator
        .comics()
        .list_by_owner(&owner.0, offset, HISTORY_PAGE_SIZE + 1)
        .await?;
    let has_next = records.len() as u64 > HISTORY_PAGE_SIZE;
    records.truncate(HISTORY_PAGE_SIZE as usize);
    Ok(HistoryTemplate {
        comics: records.iter().map(ComicView::from_record).collect(),
        page,
        has_prev: page > 1,
        has_next,
    })
}

/// handles the /credits GET
pub(crate) async fn credits_handler(
    State(state): State<AppState>,
    owner: Owner,
) -> Result<CreditsTemplate, ComicError> {
    let meter = state.coordinator.meter();
    let balance = meter.balance(&owner.0, Utc::now().date_naive()).await?;
    let comics_left = match meter.cost() {
        0 => i64::from(balance.has_credit()),
        cost => (balance.remaining() + cost - 1) / cost,
    };
    Ok(CreditsTemplate {
        daily_allowance: balance.daily_allowance,
        purchased_balance: balance.purchased_balance,
        remaining: balance.remaining(),
        comic_cost: meter.cost(),
        comics_left,
    })
}
