use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use gmf_forms::config::AppConfig;
use gmf_forms::error::AppError;
use gmf_forms::telemetry;
use gmf_forms::workflows::stamp_request::{HttpApiMailer, SubmissionError, SubmissionService};
use tracing::info;

use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_submission_routes;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(template) = args.template.take() {
        config.template.path = template;
    }

    telemetry::init(&config.telemetry)?;

    let mailer = Arc::new(
        HttpApiMailer::from_config(&config.mail)
            .map_err(|err| AppError::Submission(SubmissionError::Mail(err)))?,
    );
    let service = Arc::new(
        SubmissionService::from_template_path(&config.template.path, mailer)
            .map_err(|err| AppError::Submission(SubmissionError::Template(err)))?,
    );

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let app = with_submission_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        template = %config.template.path.display(),
        "stamp request form service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
