//! Kiểu dữ liệu lõi cho màn hình tổng quan bệnh nhân (cards, lịch hẹn, chi tiết).

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mã LOINC chỉ số BMI.
pub const BMI_CODE: &str = "39156-5";

/// Mã LOINC creatinine huyết thanh.
pub const CREATININE_CODE: &str = "2160-0";

/// Cấu hình truy vấn và hiển thị.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortalConfig {
    /// Mã Observation dùng để lấy BMI.
    pub bmi_code: String,
    /// Mã Observation cho biểu đồ creatinine.
    pub creatinine_code: String,
    /// Số trang tối đa khi đi theo liên kết `next`.
    pub page_limit: u32,
    /// Thời gian chờ mỗi request HTTP (giây).
    pub request_timeout_secs: u64,
    /// Tài khoản dùng cho người dùng ẩn danh điền questionnaire.
    pub anonymous_client_id: String,
    pub anonymous_client_secret: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            bmi_code: BMI_CODE.to_string(),
            creatinine_code: CREATININE_CODE.to_string(),
            page_limit: 20,
            request_timeout_secs: 30,
            anonymous_client_id: "patient-questionnaire".to_string(),
            anonymous_client_secret: "secret".to_string(),
        }
    }
}

impl PortalConfig {
    /// Kiểm tra các giá trị bắt buộc.
    pub fn validate(&self) -> Result<(), PortalError> {
        if self.bmi_code.trim().is_empty() {
            return Err(PortalError::Config("bmi_code cannot be empty".into()));
        }
        if self.creatinine_code.trim().is_empty() {
            return Err(PortalError::Config("creatinine_code cannot be empty".into()));
        }
        if self.page_limit == 0 {
            return Err(PortalError::Config("page_limit must be positive".into()));
        }
        Ok(())
    }
}

/// Nhóm dữ liệu lâm sàng, mỗi nhóm tương ứng một card.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Allergies,
    Conditions,
    Immunizations,
    Medications,
    Consents,
}

impl Category {
    /// Thứ tự gốc của các card trước khi sắp xếp.
    pub const ALL: [Category; 5] = [
        Category::Allergies,
        Category::Conditions,
        Category::Immunizations,
        Category::Medications,
        Category::Consents,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Category::Allergies => "Allergies",
            Category::Conditions => "Conditions",
            Category::Immunizations => "Immunizations",
            Category::Medications => "Active Medications",
            Category::Consents => "Consents",
        }
    }

    /// Loại resource FHIR chính của nhóm.
    pub fn resource_type(self) -> &'static str {
        match self {
            Category::Allergies => "AllergyIntolerance",
            Category::Conditions => "Condition",
            Category::Immunizations => "Immunization",
            Category::Medications => "MedicationStatement",
            Category::Consents => "Consent",
        }
    }
}

/// Một dòng trong card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CardRow {
    pub id: String,
    pub title: String,
    pub date: Option<String>,
    pub detail: Option<String>,
    pub recorded_by: Option<String>,
}

/// Card tổng hợp một nhóm dữ liệu lâm sàng.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub category: Category,
    pub title: String,
    pub rows: Vec<CardRow>,
}

impl Card {
    pub fn new(category: Category, rows: Vec<CardRow>) -> Self {
        Self {
            category,
            title: category.title().to_string(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Sắp xếp card theo số dòng giảm dần, giữ nguyên thứ tự khi bằng nhau.
pub fn sort_cards(cards: &mut [Card]) {
    cards.sort_by_key(|card| Reverse(card.rows.len()));
}

/// Lịch hẹn đã ghép với encounter tương ứng (nếu có).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentEntry {
    pub id: String,
    pub status: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub service: Option<String>,
    pub practitioner: Option<String>,
    pub encounter_id: Option<String>,
    pub encounter_status: Option<String>,
}

/// Kết quả tổng hợp của màn hình tổng quan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverviewData {
    pub appointments: Vec<AppointmentEntry>,
    pub cards: Vec<Card>,
}

impl OverviewData {
    /// Khởi tạo từ các thành phần đã chuẩn bị; cards được sắp xếp lại.
    pub fn new(appointments: Vec<AppointmentEntry>, mut cards: Vec<Card>) -> Self {
        sort_cards(&mut cards);
        Self {
            appointments,
            cards,
        }
    }

    pub fn card(&self, category: Category) -> Option<&Card> {
        self.cards.iter().find(|card| card.category == category)
    }
}

/// Một dòng thông tin hành chính của bệnh nhân.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientDetail {
    pub title: String,
    pub value: Option<String>,
}

impl PatientDetail {
    pub fn new(title: &str, value: Option<String>) -> Self {
        Self {
            title: title.to_string(),
            value,
        }
    }
}

/// Điểm dữ liệu cho biểu đồ theo thời gian.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesPoint {
    pub effective: Option<DateTime<Utc>>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ObservationSeries {
    pub total: usize,
    pub points: Vec<SeriesPoint>,
}

/// Giá trị hiển thị của một lựa chọn trả lời.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DisplayValue {
    Text(String),
    Integer(i64),
}

impl Default for DisplayValue {
    fn default() -> Self {
        DisplayValue::Text(String::new())
    }
}

impl std::fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayValue::Text(text) => f.write_str(text),
            DisplayValue::Integer(value) => write!(f, "{value}"),
        }
    }
}

/// Trạng thái tải dữ liệu bất đồng bộ.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T, E> {
    Loading,
    Success(T),
    Failure(E),
}

impl<T, E> Default for LoadState<T, E> {
    fn default() -> Self {
        LoadState::Loading
    }
}

impl<T, E> LoadState<T, E> {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LoadState::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, LoadState::Failure(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            LoadState::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&E> {
        match self {
            LoadState::Failure(err) => Some(err),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LoadState<U, E> {
        match self {
            LoadState::Loading => LoadState::Loading,
            LoadState::Success(data) => LoadState::Success(f(data)),
            LoadState::Failure(err) => LoadState::Failure(err),
        }
    }
}

impl<T, E> From<Result<T, E>> for LoadState<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => LoadState::Success(data),
            Err(err) => LoadState::Failure(err),
        }
    }
}

/// Lỗi chung khi dựng dữ liệu hiển thị.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortalError {
    #[error("Thiếu dữ liệu bắt buộc: {0}")]
    MissingData(String),
    #[error("Không đọc được dữ liệu: {0}")]
    Parse(String),
    #[error("Cấu hình không hợp lệ: {0}")]
    Config(String),
    #[error("Lỗi khác: {0}")]
    Other(String),
}
