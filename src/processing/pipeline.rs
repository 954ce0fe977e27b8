//! The per-event orchestration pipeline: load the deal, gate it, route it to
//! a fiscal profile, issue the receipt and write the terminal status back.
//!
//! Every webhook event runs this sequence synchronously, start to finish.
//! The pipeline never returns an error: every failure is classified into a
//! terminal [`PipelineOutcome`], with a best-effort status write-back and
//! operator notification that can never mask the primary result.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::processing::money::{build_goods_and_sum, to_minor_units};
use crate::services::{amocrm_service, checkbox_service, nova_poshta_service, telegram_service};
use crate::state::AppState;
use crate::time_window::is_receipt_allowed_now;

/// Terminal state of one processed webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    AlreadyProcessed,
    SkippedByStatus,
    MaintenanceWindow,
    ClientError {
        message: String,
    },
    ServerError {
        message: String,
    },
    Success {
        receipt_id: String,
        receipt_number: String,
        profile_id: String,
    },
}

fn dash_if_empty(value: &str) -> &str {
    if value.is_empty() {
        "—"
    } else {
        value
    }
}

/// Processes one deal id end to end.
pub async fn handle_deal_event(state: &Arc<AppState>, deal_id: i64) -> PipelineOutcome {
    info!("pipeline.start lead_id={}", deal_id);

    // 1. Load the snapshot. Nothing is written back on failure: none of the
    // deal's fields can be trusted yet.
    let snapshot = match amocrm_service::load_deal(state, deal_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let message = e.to_string();
            error!("lead.load.error lead_id={} error={}", deal_id, message);
            telegram_service::notify(
                state,
                &format!(
                    "❌ Сделка <b>{}</b>: ошибка загрузки сделки\n<code>{}</code>",
                    deal_id, message
                ),
                None,
            )
            .await;
            return PipelineOutcome::ServerError { message };
        }
    };

    // 2. Idempotence: a deal that already carries a terminal marker is done.
    if snapshot.is_already_processed() {
        info!("lead.already_processed lead_id={}", deal_id);
        return PipelineOutcome::AlreadyProcessed;
    }

    // 3. Only the target pipeline status triggers a receipt.
    if !snapshot.is_target_status(&state.config.amo.status_target) {
        info!(
            "lead.status.skip lead_id={} status_value={:?}",
            deal_id, snapshot.status_value
        );
        return PipelineOutcome::SkippedByStatus;
    }

    // 4. A waybill number is mandatory for profile routing.
    let Some(ttn) = snapshot.ttn().map(str::to_string) else {
        let message = "no TTN in deal".to_string();
        warn!("lead.no_ttn lead_id={}", deal_id);
        amocrm_service::set_processing_status(state, deal_id, &format!("ERROR: {}", message))
            .await;
        telegram_service::notify(
            state,
            &format!("❌ Сделка <b>{}</b>: нет ТТН в сделке", deal_id),
            None,
        )
        .await;
        return PipelineOutcome::ClientError { message };
    };

    // 5. Route the TTN to a cashier profile.
    let Some(profile_id) = nova_poshta_service::resolve_profile_for_ttn(state, &ttn).await else {
        let message = "TTN does not belong to known Nova Poshta accounts".to_string();
        warn!("lead.ttn_profile_not_found lead_id={} ttn={}", deal_id, ttn);
        amocrm_service::set_processing_status(state, deal_id, &format!("ERROR: {}", message))
            .await;
        telegram_service::notify(
            state,
            &format!(
                "❌ Сделка <b>{}</b>: ТТН <code>{}</code> не относится ни к одному аккаунту НП",
                deal_id, ttn
            ),
            None,
        )
        .await;
        return PipelineOutcome::ClientError { message };
    };

    let Some(profile) = state.config.checkbox.profile(&profile_id).cloned() else {
        // Routing produced a profile id with no usable credentials behind it.
        let message = format!("no Checkbox credentials for profile {}", profile_id);
        error!("lead.profile_unconfigured lead_id={} profile_id={}", deal_id, profile_id);
        amocrm_service::set_processing_status(state, deal_id, &format!("ERROR: {}", message))
            .await;
        telegram_service::notify(
            state,
            &format!(
                "❌ Сделка <b>{}</b>: нет учетных данных Checkbox для профиля {}",
                deal_id, profile_id
            ),
            None,
        )
        .await;
        return PipelineOutcome::ClientError { message };
    };

    // 6. Outside the allowed hours nothing is attempted and nothing is
    // written back: the CRM may redeliver later.
    if !is_receipt_allowed_now(&state.config.receipt_window) {
        info!("lead.maintenance_window lead_id={}", deal_id);
        return PipelineOutcome::MaintenanceWindow;
    }

    // 7. Convert purchase lines into fiscal goods.
    let (goods, total_minor) = build_goods_and_sum(&snapshot.lines);
    if goods.is_empty() || total_minor <= 0 {
        let message = "no goods or zero total".to_string();
        warn!("lead.no_goods lead_id={}", deal_id);
        amocrm_service::set_processing_status(state, deal_id, &format!("ERROR: {}", message))
            .await;
        telegram_service::notify(
            state,
            &format!(
                "❌ Сделка <b>{}</b>: ошибка создания чека\n<code>{}</code>",
                deal_id, message
            ),
            Some(&profile_id),
        )
        .await;
        return PipelineOutcome::ClientError { message };
    }

    // 8. The discount can never exceed the receipt total.
    let mut discount_minor = to_minor_units(snapshot.discount);
    if discount_minor > total_minor {
        discount_minor = total_minor;
    }

    // 9. Full fiscal session.
    let issued = match checkbox_service::issue_receipt(
        state,
        &profile,
        goods,
        total_minor,
        discount_minor,
        snapshot.email.as_deref(),
    )
    .await
    {
        Ok(issued) => issued,
        Err(e) => {
            let message = e.to_string();
            error!(
                "checkbox.create.error lead_id={} profile_id={} error={}",
                deal_id, profile_id, message
            );
            amocrm_service::set_processing_status(state, deal_id, &format!("ERROR: {}", message))
                .await;
            telegram_service::notify(
                state,
                &format!(
                    "❌ Сделка <b>{}</b>: ошибка при создании чека ({})\n<code>{}</code>",
                    deal_id,
                    telegram_service::resolve_sender_label(state, &profile_id),
                    message
                ),
                Some(&profile_id),
            )
            .await;
            return PipelineOutcome::ServerError { message };
        }
    };

    // 10. Terminal OK marker, written exactly once per successful receipt.
    let text = format!(
        "OK: {} (id: {})",
        dash_if_empty(&issued.receipt_number),
        dash_if_empty(&issued.receipt_id)
    );
    amocrm_service::set_processing_status(state, deal_id, &text).await;
    info!(
        "checkbox.create.ok lead_id={} profile_id={} receipt_id={} receipt_number={}",
        deal_id, profile_id, issued.receipt_id, issued.receipt_number
    );
    telegram_service::notify(
        state,
        &format!(
            "✅ Сделка <b>{}</b>: чек выдан успешно ({})\nID: <code>{}</code>\nНомер: <code>{}</code>",
            deal_id,
            telegram_service::resolve_sender_label(state, &profile_id),
            dash_if_empty(&issued.receipt_id),
            dash_if_empty(&issued.receipt_number)
        ),
        Some(&profile_id),
    )
    .await;

    PipelineOutcome::Success {
        receipt_id: issued.receipt_id,
        receipt_number: issued.receipt_number,
        profile_id,
    }
}
