use crate::error::ReportError;
use base64::Engine;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    RasterImage,
    EmbeddedDocument,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::RasterImage => "image",
            AttachmentKind::EmbeddedDocument => "pdf",
        }
    }
}

/// Receipt bytes attached to an expense, with the MIME type declared at upload time.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub data: Arc<[u8]>,
    pub mime: Option<String>,
}

impl Attachment {
    pub fn new(data: impl Into<Arc<[u8]>>, mime: Option<String>) -> Self {
        Self {
            data: data.into(),
            mime: mime.filter(|m| !m.trim().is_empty()),
        }
    }

    pub fn from_data_uri(uri: &str) -> Result<Self, ReportError> {
        let Some(rest) = uri.strip_prefix("data:") else {
            return Err(ReportError::Decode("not a data: uri".to_string()));
        };
        let Some((header, payload)) = rest.split_once(',') else {
            return Err(ReportError::Decode("data: uri without payload".to_string()));
        };
        let mime = header
            .split(';')
            .next()
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let data = if header.contains(";base64") {
            base64::engine::general_purpose::STANDARD
                .decode(payload.trim())
                .map_err(|e| ReportError::Decode(format!("base64 payload: {e}")))?
        } else {
            payload.as_bytes().to_vec()
        };
        Ok(Self::new(data, mime))
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn kind(&self) -> AttachmentKind {
        let declared_pdf = self
            .mime
            .as_deref()
            .map(|m| m.trim().eq_ignore_ascii_case("application/pdf"))
            .unwrap_or(false);
        if declared_pdf || self.data.starts_with(b"%PDF") {
            AttachmentKind::EmbeddedDocument
        } else {
            AttachmentKind::RasterImage
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrivingDetails {
    pub purpose: String,
    pub passengers: Option<String>,
    pub distance_km: f64,
    pub route_stops: Vec<String>,
    pub calculated_distance_km: Option<f64>,
}

impl DrivingDetails {
    pub fn new(purpose: impl Into<String>, distance_km: f64) -> Self {
        Self {
            purpose: purpose.into(),
            passengers: None,
            distance_km,
            route_stops: Vec::new(),
            calculated_distance_km: None,
        }
    }

    pub fn with_passengers(mut self, passengers: impl Into<String>) -> Self {
        let passengers = passengers.into();
        self.passengers = Some(passengers).filter(|p| !p.trim().is_empty());
        self
    }

    pub fn with_route(mut self, stops: Vec<String>, calculated_distance_km: Option<f64>) -> Self {
        self.route_stops = stops;
        self.calculated_distance_km = calculated_distance_km;
        self
    }

    /// Cost the form layer assigns to a driving record, rounded to whole cents.
    pub fn expected_cost(&self, cost_per_km: f64) -> f64 {
        (self.distance_km * cost_per_km * 100.0).round() / 100.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpenseKind {
    Standard,
    Driving(DrivingDetails),
}

/// One stored expense. Validation happens upstream; values are rendered as given.
#[derive(Debug, Clone)]
pub struct ExpenseRecord {
    pub id: Option<u64>,
    pub description: String,
    pub category: String,
    pub cost: f64,
    pub created_at_unix: i64,
    pub attachment: Option<Attachment>,
    pub kind: ExpenseKind,
}

impl ExpenseRecord {
    pub fn standard(description: impl Into<String>, category: impl Into<String>, cost: f64) -> Self {
        Self {
            id: None,
            description: description.into(),
            category: category.into(),
            cost,
            created_at_unix: 0,
            attachment: None,
            kind: ExpenseKind::Standard,
        }
    }

    /// Driving records use the trip purpose as their description.
    pub fn driving(details: DrivingDetails, category: impl Into<String>, cost: f64) -> Self {
        Self {
            id: None,
            description: details.purpose.clone(),
            category: category.into(),
            cost,
            created_at_unix: 0,
            attachment: None,
            kind: ExpenseKind::Driving(details),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_created_at(mut self, unix_seconds: i64) -> Self {
        self.created_at_unix = unix_seconds;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn driving_details(&self) -> Option<&DrivingDetails> {
        match &self.kind {
            ExpenseKind::Driving(details) => Some(details),
            ExpenseKind::Standard => None,
        }
    }

    /// The attachment, if it carries any bytes.
    pub fn receipt(&self) -> Option<&Attachment> {
        self.attachment.as_ref().filter(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReporterDetails {
    pub name: String,
    pub bank_name: String,
    pub clearing_number: String,
    pub account_number: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportHeader {
    pub report_date: String,
    pub reporter: Option<ReporterDetails>,
}

impl ReportHeader {
    pub fn new(report_date: impl Into<String>) -> Self {
        Self {
            report_date: report_date.into(),
            reporter: None,
        }
    }

    pub fn with_reporter(mut self, reporter: ReporterDetails) -> Self {
        self.reporter = Some(reporter);
        self
    }
}
