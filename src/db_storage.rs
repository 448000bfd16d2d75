use crate::errors::{AppError, ResultExt};
use crate::models::{Lead, LeadFields};
use sqlx::PgPool;

/// Table holding the leads, shared by the CRUD service and provisioning.
pub const LEADS_TABLE: &str = "public.pre_leads";

const CREATE_LEADS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS public.pre_leads (
        user_id serial NOT NULL,
        first_name varchar NULL,
        last_name varchar NULL,
        email_address varchar NULL,
        phone_number varchar NULL,
        company varchar NULL,
        CONSTRAINT leads_pk PRIMARY KEY (user_id)
    )
"#;

/// The lead seeded by provisioning.
pub fn example_lead() -> LeadFields {
    LeadFields {
        first_name: Some("Bill".to_string()),
        last_name: Some("Gates".to_string()),
        email_address: Some("billgates@example.com".to_string()),
        phone_number: Some("+1-202-555-0131".to_string()),
        company: Some("Microsoft".to_string()),
    }
}

/// Database access for `public.pre_leads`. Every statement is parameterized.
#[derive(Clone)]
pub struct LeadRepository {
    pool: PgPool,
}

impl LeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the table if it does not exist yet.
    pub async fn ensure_table(&self) -> Result<(), AppError> {
        sqlx::query(CREATE_LEADS_TABLE)
            .execute(&self.pool)
            .await
            .context("Creating table public.pre_leads")?;
        Ok(())
    }

    /// Inserts the example lead unless a lead with its email already exists.
    ///
    /// Returns the new `user_id`, or `None` when the lead was already there.
    pub async fn seed_example_lead(&self) -> Result<Option<i32>, AppError> {
        let lead = example_lead();
        let user_id: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO public.pre_leads
                (first_name, last_name, company, email_address, phone_number)
            SELECT $1, $2, $3, $4, $5
            WHERE NOT EXISTS (
                SELECT 1 FROM public.pre_leads WHERE email_address = $4
            )
            RETURNING user_id
            "#,
        )
        .bind(&lead.first_name)
        .bind(&lead.last_name)
        .bind(&lead.company)
        .bind(&lead.email_address)
        .bind(&lead.phone_number)
        .fetch_optional(&self.pool)
        .await
        .context("Seeding example lead")?;

        Ok(user_id)
    }

    pub async fn list(&self) -> Result<Vec<Lead>, AppError> {
        let leads = sqlx::query_as::<_, Lead>(
            r#"
            SELECT user_id, first_name, last_name, email_address, phone_number, company
            FROM public.pre_leads
            ORDER BY user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(leads)
    }

    /// Inserts a lead and returns its assigned `user_id`.
    pub async fn insert(&self, fields: &LeadFields) -> Result<i32, AppError> {
        let user_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO public.pre_leads
                (first_name, last_name, company, email_address, phone_number)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING user_id
            "#,
        )
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.company)
        .bind(&fields.email_address)
        .bind(&fields.phone_number)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("✓ Lead {} created", user_id);
        Ok(user_id)
    }

    pub async fn update(&self, user_id: i32, fields: &LeadFields) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE public.pre_leads SET
                first_name = $1,
                last_name = $2,
                company = $3,
                email_address = $4,
                phone_number = $5
            WHERE user_id = $6
            "#,
        )
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.company)
        .bind(&fields.email_address)
        .bind(&fields.phone_number)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Lead {} not found", user_id)));
        }

        tracing::info!("✓ Lead {} updated", user_id);
        Ok(())
    }

    pub async fn delete(&self, user_id: i32) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM public.pre_leads WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Lead {} not found", user_id)));
        }

        tracing::info!("✓ Lead {} deleted", user_id);
        Ok(())
    }
}
