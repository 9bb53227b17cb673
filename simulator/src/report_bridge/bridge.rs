use crate::report_bridge::model::{AnalyzeRequest, ReportModel};
use crate::workflow::runner::Runner;
use anyhow::{anyhow, Result};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use transientcore::pipeline::AnalysisReport;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Filter;

type SharedModel = Arc<RwLock<ReportModel>>;

/// HTTP handoff to the presentation side: `GET /report` returns the latest
/// report, `POST /analyze` runs an event and publishes its report.
pub struct ReportBridge {
    state: SharedModel,
    runner: Arc<Runner>,
}

impl ReportBridge {
    pub fn new(runner: Arc<Runner>) -> Self {
        Self {
            state: Arc::new(RwLock::new(ReportModel::default())),
            runner,
        }
    }

    pub fn publish(&self, report: AnalysisReport) -> Result<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| anyhow!("report state lock poisoned"))?;
        log::info!(
            "publishing report for event {} ({} sensors)",
            report.event_time,
            report.sensors.len()
        );
        guard.push(report);
        Ok(())
    }

    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (WithStatus<Json>,), Error = warp::Rejection> + Clone {
        let state = self.state.clone();
        let state_filter = warp::any().map(move || state.clone());
        let runner = self.runner.clone();
        let runner_filter = warp::any().map(move || runner.clone());

        let get_route = warp::path("report")
            .and(warp::path::end())
            .and(warp::get())
            .and(state_filter.clone())
            .map(|state: SharedModel| latest_reply(&state));

        let post_route = warp::path("analyze")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::json())
            .and(state_filter)
            .and(runner_filter)
            .and_then(
                |request: AnalyzeRequest, state: SharedModel, runner: Arc<Runner>| async move {
                    let reply = match runner.execute(request.event_time).await {
                        Ok(report) => {
                            let body = warp::reply::json(&report);
                            match state.write() {
                                Ok(mut guard) => {
                                    guard.push(report);
                                    warp::reply::with_status(body, StatusCode::OK)
                                }
                                Err(_) => error_reply(
                                    "report state lock poisoned",
                                    StatusCode::INTERNAL_SERVER_ERROR,
                                ),
                            }
                        }
                        Err(err) => {
                            log::error!("analyze error: {:#}", err);
                            error_reply(&format!("{:#}", err), StatusCode::BAD_REQUEST)
                        }
                    };
                    Ok::<_, warp::Rejection>(reply)
                },
            );

        get_route.or(post_route).unify()
    }

    pub async fn serve(self, addr: SocketAddr) {
        log::info!("report bridge listening on {}", addr);
        warp::serve(self.routes()).run(addr).await;
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> ReportModel {
        self.state
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

fn latest_reply(state: &SharedModel) -> WithStatus<Json> {
    match state.read() {
        Ok(model) => match model.latest() {
            Some(report) => warp::reply::with_status(warp::reply::json(report), StatusCode::OK),
            None => error_reply("no report published yet", StatusCode::NOT_FOUND),
        },
        Err(_) => error_reply("report state lock poisoned", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

fn error_reply(message: &str, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(
        warp::reply::json(&json!({ "status": "error", "message": message })),
        status,
    )
}
