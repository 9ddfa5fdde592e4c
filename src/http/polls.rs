use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{info, warn};

use crate::models::poll::{
    HasVotedView, OptionSaveRequest, OptionSaveResponse, OptionView, PollCreateRequest,
    PollDetailView, PollResults, PollStatusView, PollView, VoteSubmissionRequest,
    VoteSubmissionResponse,
};
use crate::polls::{DEFAULT_REDIRECT, OptionForm, PollError, PollForm, SaveStatus, Voter};
use crate::state::AppState;

use super::HttpError;

const MAX_IDENTIFIER_PARAM_LEN: usize = 128;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/polls", get(list_polls).post(create_poll))
        .route("/polls/status", get(get_status))
        .route(
            "/polls/by-identifier/{identifier}",
            get(get_poll_by_identifier),
        )
        .route("/polls/{poll_id}", get(get_poll).delete(delete_poll))
        .route(
            "/polls/{poll_id}/options",
            get(get_poll_options).post(create_poll_option),
        )
        .route("/polls/{poll_id}/results", get(get_poll_results))
        .route("/polls/{poll_id}/votes", post(submit_vote))
        .route("/polls/{poll_id}/voted/{voter_id}", get(get_has_voted))
        .route("/options", post(save_option))
        .route("/options/{option_id}", get(get_option))
}

async fn get_status(State(state): State<AppState>) -> Json<PollStatusView> {
    Json(PollStatusView {
        enabled: state.polls.is_poll_enabled(),
    })
}

async fn list_polls(State(state): State<AppState>) -> Result<Json<Vec<PollView>>, HttpError> {
    let polls = state.polls.get_all_polls().await?;
    Ok(Json(polls.into_iter().map(PollView::from).collect()))
}

async fn create_poll(
    State(state): State<AppState>,
    Json(request): Json<PollCreateRequest>,
) -> Result<(StatusCode, Json<PollView>), HttpError> {
    let created = state
        .polls
        .create_poll(PollForm {
            identifier: request.identifier,
            title: request.title,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(PollView::from(created))))
}

async fn get_poll(
    Path(poll_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<PollDetailView>, HttpError> {
    let poll = state
        .polls
        .get_poll(poll_id)
        .await?
        .ok_or_else(|| PollError::not_found("poll", poll_id))?;
    let options = state.polls.get_options(poll.id).await?;

    Ok(Json(PollDetailView {
        poll: PollView::from(poll),
        options: options.into_iter().map(OptionView::from).collect(),
    }))
}

async fn get_poll_by_identifier(
    Path(identifier): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PollDetailView>, HttpError> {
    if identifier.len() > MAX_IDENTIFIER_PARAM_LEN {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "identifier exceeds length limit".to_string(),
        ));
    }

    let poll = state
        .polls
        .get_poll_by_identifier(&identifier)
        .await?
        .ok_or_else(|| PollError::not_found("poll", identifier.trim()))?;
    let options = state.polls.get_options(poll.id).await?;

    Ok(Json(PollDetailView {
        poll: PollView::from(poll),
        options: options.into_iter().map(OptionView::from).collect(),
    }))
}

async fn delete_poll(
    Path(poll_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<StatusCode, HttpError> {
    state.polls.delete_poll(poll_id).await?;
    state.cache.invalidate_results(poll_id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_poll_options(
    Path(poll_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<Vec<OptionView>>, HttpError> {
    if state.polls.get_poll(poll_id).await?.is_none() {
        return Err(PollError::not_found("poll", poll_id).into());
    }
    let options = state.polls.get_options(poll_id).await?;
    Ok(Json(options.into_iter().map(OptionView::from).collect()))
}

async fn get_option(
    Path(option_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<OptionView>, HttpError> {
    let option = state
        .polls
        .get_option(option_id)
        .await?
        .ok_or_else(|| PollError::not_found("option", option_id))?;
    Ok(Json(OptionView::from(option)))
}

/// Option form posted under a poll; the path poll id wins over the body.
async fn create_poll_option(
    Path(poll_id): Path<i32>,
    State(state): State<AppState>,
    Json(mut request): Json<OptionSaveRequest>,
) -> Result<(StatusCode, Json<OptionSaveResponse>), HttpError> {
    request.poll_id = Some(poll_id);
    persist_option(&state, request).await
}

async fn save_option(
    State(state): State<AppState>,
    Json(request): Json<OptionSaveRequest>,
) -> Result<(StatusCode, Json<OptionSaveResponse>), HttpError> {
    persist_option(&state, request).await
}

async fn persist_option(
    state: &AppState,
    request: OptionSaveRequest,
) -> Result<(StatusCode, Json<OptionSaveResponse>), HttpError> {
    let form = OptionForm {
        id: request.id,
        poll_id: request.poll_id,
        title: request.title,
        weight: request.weight,
    };

    let saved = state
        .polls
        .save_option(form)
        .await
        .map_err(|err| HttpError::from(err).with_redirect(DEFAULT_REDIRECT))?;
    state.cache.invalidate_results(saved.option.poll_id).await;

    let status = match saved.status {
        SaveStatus::Created => StatusCode::CREATED,
        SaveStatus::Updated => StatusCode::OK,
    };
    let redirect = saved.redirect();
    let response = OptionSaveResponse {
        message: format!("The option {} has been saved.", saved.option.title),
        status: saved.status.as_str().to_string(),
        option: OptionView::from(saved.option),
        redirect,
    };
    Ok((status, Json(response)))
}

async fn get_has_voted(
    Path((poll_id, voter_id)): Path<(i32, i64)>,
    State(state): State<AppState>,
) -> Result<Json<HasVotedView>, HttpError> {
    let has_voted = state.polls.has_user_voted(poll_id, voter_id).await?;
    Ok(Json(HasVotedView {
        poll_id,
        voter_id,
        has_voted,
    }))
}

async fn get_poll_results(
    Path(poll_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<PollResults>, HttpError> {
    if let Some(cached) = state.cache.results.get(&poll_id).await {
        return Ok(Json(cached.as_ref().clone()));
    }

    let results = load_results(&state, poll_id).await?;
    Ok(Json(results.as_ref().clone()))
}

async fn submit_vote(
    Path(poll_id): Path<i32>,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<VoteSubmissionRequest>,
) -> Result<(StatusCode, Json<VoteSubmissionResponse>), HttpError> {
    let voter = Voter {
        user_id: request.voter_id,
        ip_address: addr.ip().to_string(),
    };

    let receipt = state
        .polls
        .record_vote(poll_id, request.option_id, &voter)
        .await
        .inspect_err(|err| {
            if matches!(err, PollError::AlreadyVoted { .. }) {
                warn!(
                    poll_id,
                    voter_id = voter.user_id,
                    ip = %voter.ip_address,
                    "Duplicate vote refused"
                );
            }
        })?;

    state.cache.invalidate_results(poll_id).await;
    let results = refreshed_results(&state, poll_id).await;

    Ok((
        StatusCode::CREATED,
        Json(VoteSubmissionResponse {
            vote: receipt,
            results: results.map(|results| results.as_ref().clone()),
        }),
    ))
}

/// Results to hand back with a recorded vote. The vote is already committed,
/// so a failed read is logged and reported as missing results only.
async fn refreshed_results(state: &AppState, poll_id: i32) -> Option<Arc<PollResults>> {
    match load_results(state, poll_id).await {
        Ok(results) => {
            info!(
                poll_id,
                total_votes = results.total_votes,
                "Results refreshed after vote"
            );
            Some(results)
        }
        Err(err) => {
            warn!(poll_id, "Results refresh after vote failed: {}", err.message());
            None
        }
    }
}

async fn load_results(state: &AppState, poll_id: i32) -> Result<Arc<PollResults>, HttpError> {
    let generation = state.cache.results_generation();
    let results = state
        .polls
        .get_results(poll_id)
        .await?
        .ok_or_else(|| PollError::not_found("poll", poll_id))?;
    let results = Arc::new(results);
    state
        .cache
        .store_results(poll_id, generation, Arc::clone(&results))
        .await;
    Ok(results)
}
