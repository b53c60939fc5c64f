use tower_sessions::Session;

use crate::error::ComicError;
use crate::pipeline::PipelineError;

const FLASH_FLAG_KEY: &str = "flash_flag";

pub(crate) const FLASH_EMPTY_IDEA: u16 = 1;
pub(crate) const FLASH_IDEA_TOO_LONG: u16 = 2;
pub(crate) const FLASH_NO_CREDITS: u16 = 3;
pub(crate) const FLASH_PLANNING_FAILED: u16 = 4;
pub(crate) const FLASH_ALL_PANELS_FAILED: u16 = 5;
pub(crate) const FLASH_SESSION_EXPIRED: u16 = 6;
pub(crate) const FLASH_STORAGE_FAILED: u16 = 7;

#[derive(Clone, Debug)]
pub(crate) struct FlashMessage {
    pub(crate) text: &'static str,
    pub(crate) class: &'static str,
}

pub(crate) async fn set_flash(session: &Session, flag: u16) -> Result<(), ComicError> {
    session
        .insert(FLASH_FLAG_KEY, flag)
        .await
        .map_err(|err| ComicError::InternalServerError(err.to_string()))?;
    Ok(())
}

pub(crate) async fn take_flash_message(
    session: &Session,
) -> Result<Option<FlashMessage>, ComicError> {
    let flag = session
        .get::<u16>(FLASH_FLAG_KEY)
        .await
        .map_err(|err| ComicError::InternalServerError(err.to_string()))?
        .filter(|flag| *flag != 0);
    if flag.is_some() {
        session
            .insert(FLASH_FLAG_KEY, 0u16)
            .await
            .map_err(|err| ComicError::InternalServerError(err.to_string()))?;
    }
    Ok(flag.and_then(message_for))
}

/// Flash flag for a failed run.
pub(crate) fn flag_for(err: &PipelineError) -> u16 {
    match err {
        PipelineError::EmptyIdea => FLASH_EMPTY_IDEA,
        PipelineError::IdeaTooLong { .. } => FLASH_IDEA_TOO_LONG,
        PipelineError::InsufficientCredits => FLASH_NO_CREDITS,
        PipelineError::PlanningFailed(_) => FLASH_PLANNING_FAILED,
        PipelineError::AllPanelsFailed { .. } => FLASH_ALL_PANELS_FAILED,
        PipelineError::Store(_) => FLASH_STORAGE_FAILED,
    }
}

fn message_for(flag: u16) -> Option<FlashMessage> {
    match flag {
        FLASH_EMPTY_IDEA => Some(FlashMessage {
            text: "Please describe your comic idea first.",
            class: "warning",
        }),
        FLASH_IDEA_TOO_LONG => Some(FlashMessage {
            text: "That idea is too long, please shorten it.",
            class: "warning",
        }),
        FLASH_NO_CREDITS => Some(FlashMessage {
            text: "You're out of credits for today. Recharge to keep drawing.",
            class: "error",
        }),
        FLASH_PLANNING_FAILED => Some(FlashMessage {
            text: "We couldn't come up with scenes for that idea. No credits were used, please try again.",
            class: "error",
        }),
        FLASH_ALL_PANELS_FAILED => Some(FlashMessage {
            text: "None of the panels could be drawn. No credits were used, please try again.",
            class: "error",
        }),
        FLASH_SESSION_EXPIRED => Some(FlashMessage {
            text: "Your session expired, please submit the form again.",
            class: "warning",
        }),
        FLASH_STORAGE_FAILED => Some(FlashMessage {
            text: "Something went wrong on our side, please try again shortly.",
            class: "error",
        }),
        _ => None,
    }
}
