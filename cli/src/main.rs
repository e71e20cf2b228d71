use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use portal_client::{
    load_launch_context, load_observation_series, HttpFhirStore, PatientOverview,
    QuestionnaireLaunch, ResourceStore, Session,
};
use portal_core::{LoadState, PortalConfig, BMI_CODE, CREATININE_CODE};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "portal-cli",
    about = "Tổng quan bệnh nhân từ máy chủ FHIR."
)]
struct Args {
    /// Địa chỉ gốc của máy chủ FHIR.
    #[arg(long, env = "PORTAL_FHIR_URL")]
    base_url: String,

    /// Bearer token; bỏ trống để truy cập ẩn danh.
    #[arg(long, env = "PORTAL_FHIR_TOKEN")]
    token: Option<String>,

    /// Thời gian chờ mỗi request (giây).
    #[arg(long, env = "PORTAL_REQUEST_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Số trang tối đa khi đi theo liên kết `next`.
    #[arg(long, env = "PORTAL_PAGE_LIMIT", default_value_t = 20)]
    page_limit: u32,

    /// Mã Observation của BMI.
    #[arg(long, env = "PORTAL_BMI_CODE", default_value = BMI_CODE)]
    bmi_code: String,

    /// Mã Observation cho chuỗi creatinine.
    #[arg(long, env = "PORTAL_CREATININE_CODE", default_value = CREATININE_CODE)]
    creatinine_code: String,

    /// Client dùng cho phiên ẩn danh.
    #[arg(long, env = "PORTAL_ANONYMOUS_CLIENT_ID", default_value = "patient-questionnaire")]
    anonymous_client_id: String,

    #[arg(
        long,
        env = "PORTAL_ANONYMOUS_CLIENT_SECRET",
        default_value = "secret",
        hide_env_values = true
    )]
    anonymous_client_secret: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cards, lịch hẹn và BMI của một bệnh nhân.
    Overview {
        #[arg(short, long)]
        patient: String,
    },
    /// Chuỗi giá trị Observation theo thời gian (mặc định creatinine).
    Series {
        #[arg(short, long)]
        patient: String,
        #[arg(long)]
        code: Option<String>,
    },
    /// Ngữ cảnh mở questionnaire từ query string của trang.
    Questionnaire {
        /// Ví dụ: "patient=p1&questionnaire=intake&encounter=e1"
        #[arg(long)]
        query: String,
        /// Resource vai trò của người dùng đã đăng nhập, dạng Type/id.
        #[arg(long)]
        role: Option<String>,
    },
}

impl Args {
    fn config(&self) -> PortalConfig {
        PortalConfig {
            bmi_code: self.bmi_code.clone(),
            creatinine_code: self.creatinine_code.clone(),
            page_limit: self.page_limit,
            request_timeout_secs: self.timeout,
            anonymous_client_id: self.anonymous_client_id.clone(),
            anonymous_client_secret: self.anonymous_client_secret.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("portal_client=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = args.config();
    config.validate()?;

    let store = HttpFhirStore::new(&args.base_url, &config)
        .with_context(|| format!("Không tạo được client cho {}", args.base_url))?;
    let session = match args.token {
        Some(token) => Session {
            token: Some(token),
            role: None,
        },
        None => Session::anonymous(),
    };

    let output = match args.command {
        Command::Overview { patient } => {
            let store = store.with_credentials(session.credentials(&config));
            overview(store, &patient, config).await?
        }
        Command::Series { patient, code } => {
            let store = store.with_credentials(session.credentials(&config));
            let code = code.unwrap_or_else(|| config.creatinine_code.clone());
            let series = load_observation_series(&store, &patient, &code)
                .await
                .with_context(|| format!("Không tải được Observation {code}"))?;
            serde_json::to_value(series)?
        }
        Command::Questionnaire { query, role } => {
            questionnaire(store, session, &query, role.as_deref(), &config).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn overview(
    store: HttpFhirStore,
    patient_id: &str,
    config: PortalConfig,
) -> anyhow::Result<Value> {
    let patient = store
        .read("Patient", patient_id)
        .await
        .with_context(|| format!("Không đọc được Patient/{patient_id}"))?;

    let mut overview = PatientOverview::new(Arc::new(store), patient, config);
    overview.reload().await;

    let details = overview.patient_details(Utc::now().date_naive());
    let response = match overview.response() {
        LoadState::Success(data) => serde_json::to_value(data)?,
        LoadState::Failure(err) => json!({ "error": err.to_string() }),
        LoadState::Loading => Value::Null,
    };
    if let LoadState::Failure(err) = overview.bmi() {
        tracing::warn!(error = %err, "BMI unavailable");
    }

    Ok(json!({
        "patient_details": details,
        "overview": response,
    }))
}

async fn questionnaire(
    store: HttpFhirStore,
    mut session: Session,
    query: &str,
    role: Option<&str>,
    config: &PortalConfig,
) -> anyhow::Result<Value> {
    let launch = QuestionnaireLaunch::from_query(query)?;
    let store = store.with_credentials(session.credentials(config));

    if let Some(reference) = role.filter(|_| !session.is_anonymous()) {
        let (resource_type, id) = reference
            .split_once('/')
            .with_context(|| format!("Role phải có dạng Type/id: {reference}"))?;
        let resource = store
            .read(resource_type, id)
            .await
            .with_context(|| format!("Không đọc được {reference}"))?;
        session.role = Some(resource);
    }

    let context = load_launch_context(&store, &launch, &session)
        .await
        .with_context(|| {
            format!("Không mở được questionnaire {}", launch.questionnaire_id)
        })?;

    Ok(serde_json::to_value(context)?)
}
