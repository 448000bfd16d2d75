use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============ Database Models ============

/// A row of `public.pre_leads`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    /// Serial primary key.
    pub user_id: i32,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_address: Option<String>,
    pub phone_number: Option<String>,
    pub company: Option<String>,
}

/// Column values for an insert or update of a lead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_address: Option<String>,
    pub phone_number: Option<String>,
    pub company: Option<String>,
}

// ============ Web Models ============

/// Form posted to `/manage-lead`.
///
/// One form covers both operations: a non-empty `user_id` updates that lead,
/// otherwise a new lead is inserted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadForm {
    pub user_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl LeadForm {
    /// Form values as column values. Blank inputs become NULL.
    pub fn fields(&self) -> LeadFields {
        let clean = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        LeadFields {
            first_name: clean(&self.first_name),
            last_name: clean(&self.last_name),
            email_address: clean(&self.email),
            phone_number: clean(&self.phone_number),
            company: clean(&self.company),
        }
    }
}

// ============ Streaming Models ============

/// A lead as consumed from the `clean_leads` topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CleanLeadEvent {
    pub user_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Scraped profile after filtering, as a JSON object.
pub type ProfileDocument = serde_json::Map<String, serde_json::Value>;

/// Fields the completion model is asked to produce for a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredSummary {
    pub summary: String,
    pub latest_position: String,
    pub facts: Vec<String>,
    pub topic_of_interest: String,
    pub ice_breakers: Vec<String>,
}

/// A lead published to `<source>_enriched`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedLead {
    pub user_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub email_address: Option<String>,
    pub phone_number: Option<String>,
    /// [`StructuredSummary`] serialized as JSON text.
    pub context: String,
    pub linkedin_profile_url: String,
}

impl EnrichedLead {
    /// Combines the consumed event with its enrichment. `user_id` is carried over unchanged.
    pub fn from_event(
        event: &CleanLeadEvent,
        summary: &StructuredSummary,
        linkedin_profile_url: String,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            user_id: event.user_id,
            first_name: event.first_name.clone(),
            last_name: event.last_name.clone(),
            company: event.company.clone(),
            email_address: event.email_address.clone(),
            phone_number: event.phone_number.clone(),
            context: serde_json::to_string(summary)?,
            linkedin_profile_url,
        })
    }
}
