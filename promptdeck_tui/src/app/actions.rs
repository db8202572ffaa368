use anyhow::Result;
use promptdeck_core::ExpandMode;
use std::time::Instant;

use crate::app::state::{App, FocusArea, FooterAction};

/// Runs a footer action. Returns `true` when the app should exit.
pub async fn perform_footer_action(
    app: &mut App,
    action: FooterAction,
    now: Instant,
) -> Result<bool> {
    match action {
        FooterAction::Quit => return Ok(true),
        FooterAction::TryPrompt => {
            app.focus = FocusArea::Content;
            app.try_selected(now);
        }
        FooterAction::ViewDetails => {
            app.focus = FocusArea::Content;
            app.view_selected_details(now);
        }
        FooterAction::ClearRecent => app.clear_recent(),
        FooterAction::OpenChains => app.open_chain_picker(),
        FooterAction::NextStep => app.advance_chain(now),
        FooterAction::CancelChain => app.request_cancel_chain(),
        FooterAction::Send => {
            app.focus = FocusArea::Content;
            app.submit_input();
        }
        FooterAction::Export => {
            if let Err(e) = app.export_chat().await {
                app.push_log(format!("Export failed: {:#}", e));
                app.notice = Some(format!("Export failed: {}", e));
                app.dirty = true;
            }
        }
        FooterAction::SwitchToDetails => {
            app.switch_expanded(ExpandMode::Details, now);
        }
        FooterAction::SwitchToChat => {
            app.focus = FocusArea::Content;
            app.switch_expanded(ExpandMode::Chat, now);
        }
        FooterAction::Close => {
            app.focus = FocusArea::Content;
            app.close_card(now);
        }
        FooterAction::ToggleLog => {
            app.show_log = !app.show_log;
            app.push_log(format!(
                "Session log pane: {}",
                if app.show_log { "ON" } else { "OFF" }
            ));
            app.dirty = true;
        }
        FooterAction::StartChain => {
            app.focus = FocusArea::Content;
            app.start_selected_chain(now);
        }
        FooterAction::CloseOverlay => {
            app.focus = FocusArea::Content;
            app.close_overlay();
        }
        FooterAction::ConfirmCancelChain => {
            app.focus = FocusArea::Content;
            app.resolve_cancel_chain(true);
        }
        FooterAction::KeepChain => {
            app.focus = FocusArea::Content;
            app.resolve_cancel_chain(false);
        }
        FooterAction::Suggestion(idx) => {
            app.focus = FocusArea::Content;
            app.select_suggestion(idx, now);
        }
    }

    Ok(false)
}
