//! # Database Module
//!
//! Postgres implementation of every collaborator store, on top of `sqlx`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveTime};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use crate::dialogue::{Category, PaymentMethod, ScheduledDate};
use crate::errors::StoreError;
use crate::services::{
    ClientProfile, Directory, NewOrder, NewReview, NewStaff, OrderRecord, OrderStats,
    OrderStatus, OrderStore, ReferralRecord, ReferralStore, ReviewStore, Role, StaffUpdate,
    StatsPeriod, StatsStore, UserRecord,
};

const USER_COLUMNS: &str =
    "id, chat_id, role, first_name, last_name, nickname, phone, is_blocked";
const ORDER_COLUMNS: &str = "id, client_chat_id, category, subcategory, name, photos, video, \
     urgent, date, time, phone, address, description, payment_method, status";

/// Open the connection pool
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("Failed to connect to database")
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            chat_id BIGINT UNIQUE,
            role TEXT NOT NULL CHECK (role IN ('client','operator','main_operator','driver','loader','owner')),
            first_name VARCHAR(255),
            last_name VARCHAR(255),
            nickname VARCHAR(100) UNIQUE,
            phone VARCHAR(20),
            is_blocked BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS orders (
            id BIGSERIAL PRIMARY KEY,
            client_chat_id BIGINT NOT NULL,
            category TEXT NOT NULL CHECK (category IN ('waste_removal','demolition','construction_materials')),
            subcategory VARCHAR(100) NOT NULL,
            name VARCHAR(255) NOT NULL,
            photos TEXT[] NOT NULL DEFAULT '{}',
            video TEXT,
            urgent BOOLEAN NOT NULL DEFAULT FALSE,
            date DATE,
            time TIME,
            phone VARCHAR(20) NOT NULL,
            address TEXT NOT NULL,
            description TEXT,
            payment_method TEXT NOT NULL CHECK (payment_method IN ('cash','card')),
            status TEXT NOT NULL DEFAULT 'new' CHECK (status IN ('new','accepted','rejected','completed')),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create orders table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS reviews (
            id BIGSERIAL PRIMARY KEY,
            order_id BIGINT NOT NULL UNIQUE REFERENCES orders(id) ON DELETE CASCADE,
            client_chat_id BIGINT NOT NULL,
            rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
            comment TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create reviews table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS referrals (
            id BIGSERIAL PRIMARY KEY,
            inviter_chat_id BIGINT NOT NULL,
            invitee_chat_id BIGINT NOT NULL UNIQUE,
            payout_requested BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create referrals table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)")
        .execute(pool)
        .await
        .context("Failed to create orders status index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_referrals_inviter ON referrals(inviter_chat_id)")
        .execute(pool)
        .await
        .context("Failed to create referrals index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    chat_id: Option<i64>,
    role: String,
    first_name: Option<String>,
    last_name: Option<String>,
    nickname: Option<String>,
    phone: Option<String>,
    is_blocked: bool,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::from_str_value(&row.role)
            .ok_or_else(|| StoreError::InvalidData(format!("user role {}", row.role)))?;

        Ok(UserRecord {
            id: row.id,
            chat_id: row.chat_id,
            role,
            first_name: row.first_name,
            last_name: row.last_name,
            nickname: row.nickname,
            phone: row.phone,
            is_blocked: row.is_blocked,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    client_chat_id: i64,
    category: String,
    subcategory: String,
    name: String,
    photos: Vec<String>,
    video: Option<String>,
    urgent: bool,
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    phone: String,
    address: String,
    description: Option<String>,
    payment_method: String,
    status: String,
}

impl TryFrom<OrderRow> for OrderRecord {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let category = Category::from_str_value(&row.category)
            .ok_or_else(|| StoreError::InvalidData(format!("order category {}", row.category)))?;
        let payment = PaymentMethod::from_token(&row.payment_method).ok_or_else(|| {
            StoreError::InvalidData(format!("payment method {}", row.payment_method))
        })?;
        let status = OrderStatus::from_str_value(&row.status)
            .ok_or_else(|| StoreError::InvalidData(format!("order status {}", row.status)))?;
        let date = match (row.urgent, row.date) {
            (true, _) => ScheduledDate::Urgent,
            (false, Some(date)) => ScheduledDate::On(date),
            (false, None) => {
                return Err(StoreError::InvalidData(format!("order {} has no date", row.id)))
            }
        };

        Ok(OrderRecord {
            id: row.id,
            status,
            order: NewOrder {
                client_chat_id: row.client_chat_id,
                category,
                subcategory: row.subcategory,
                name: row.name,
                photos: row.photos,
                video: row.video,
                date,
                time: row.time,
                phone: row.phone,
                address: row.address,
                description: row.description,
                payment,
            },
        })
    }
}

#[derive(Debug, FromRow)]
struct ReferralRow {
    inviter_chat_id: i64,
    invitee_chat_id: i64,
    payout_requested: bool,
}

#[derive(Debug, FromRow)]
struct OrderCountsRow {
    total_orders: i64,
    waste_removal: i64,
    demolition: i64,
    construction_materials: i64,
    completed: i64,
}

#[derive(Debug, FromRow)]
struct ReviewCountsRow {
    reviews: i64,
    average_rating: Option<f64>,
}

/// Postgres-backed collaborator stores
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_user(&self, sql: &str, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserRecord::try_from).transpose()
    }
}

fn expect_one(rows_affected: u64, what: String) -> Result<(), StoreError> {
    if rows_affected == 0 {
        return Err(StoreError::NotFound(what));
    }
    Ok(())
}

#[async_trait]
impl Directory for PgStore {
    async fn find_by_chat(&self, chat_id: i64) -> Result<Option<UserRecord>, StoreError> {
        self.fetch_user(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE chat_id = $1"),
            chat_id,
        )
        .await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        self.fetch_user(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"), id)
            .await
    }

    async fn register_client(
        &self,
        chat_id: i64,
        profile: &ClientProfile,
    ) -> Result<UserRecord, StoreError> {
        sqlx::query(
            "INSERT INTO users (chat_id, role, first_name, last_name)
             VALUES ($1, 'client', $2, $3)
             ON CONFLICT (chat_id) DO NOTHING",
        )
        .bind(chat_id)
        .bind(profile.first_name.as_deref())
        .bind(profile.last_name.as_deref())
        .execute(&self.pool)
        .await?;

        self.find_by_chat(chat_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user with chat {chat_id}")))
    }

    async fn claim_staff(
        &self,
        chat_id: i64,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let pending: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM users WHERE lower(nickname) = lower($1) AND chat_id IS NULL",
        )
        .bind(username)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((staff_id,)) = pending else {
            return Ok(None);
        };

        // The chat may already be registered as a client
        sqlx::query("DELETE FROM users WHERE chat_id = $1 AND role = 'client'")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET chat_id = $1, updated_at = NOW() WHERE id = $2 RETURNING {USER_COLUMNS}"
        ))
        .bind(chat_id)
        .bind(staff_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(chat_id, staff_id, "Staff record claimed");
        UserRecord::try_from(row).map(Some)
    }

    async fn nickname_taken(&self, nickname: &str) -> Result<bool, StoreError> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE lower(nickname) = lower($1))")
                .bind(nickname)
                .fetch_one(&self.pool)
                .await?;
        Ok(taken)
    }

    async fn create_staff(&self, staff: &NewStaff) -> Result<UserRecord, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (role, first_name, last_name, nickname, phone)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(staff.role.as_str())
        .bind(&staff.first_name)
        .bind(&staff.last_name)
        .bind(&staff.nickname)
        .bind(&staff.phone)
        .fetch_one(&self.pool)
        .await?;

        UserRecord::try_from(row)
    }

    async fn update_staff(&self, id: i64, update: &StaffUpdate) -> Result<(), StoreError> {
        let (column, value) = match update {
            StaffUpdate::FirstName(value) => ("first_name", value.as_str()),
            StaffUpdate::LastName(value) => ("last_name", value.as_str()),
            StaffUpdate::Phone(value) => ("phone", value.as_str()),
            StaffUpdate::Role(role) => ("role", role.as_str()),
        };

        let result = sqlx::query(&format!(
            "UPDATE users SET {column} = $2, updated_at = NOW() WHERE id = $1"
        ))
        .bind(id)
        .bind(value)
        .execute(&self.pool)
        .await?;

        expect_one(result.rows_affected(), format!("user {id}"))
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<UserRecord>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY id"
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRecord::try_from).collect()
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_one(result.rows_affected(), format!("user {id}"))
    }

    async fn set_blocked(&self, id: i64, blocked: bool) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE users SET is_blocked = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(blocked)
                .execute(&self.pool)
                .await?;
        expect_one(result.rows_affected(), format!("user {id}"))
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn create(&self, order: &NewOrder) -> Result<i64, StoreError> {
        let (urgent, date) = match order.date {
            ScheduledDate::Urgent => (true, None),
            ScheduledDate::On(date) => (false, Some(date)),
        };

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO orders (client_chat_id, category, subcategory, name, photos, video,
                                 urgent, date, time, phone, address, description, payment_method)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING id",
        )
        .bind(order.client_chat_id)
        .bind(order.category.as_str())
        .bind(&order.subcategory)
        .bind(&order.name)
        .bind(&order.photos)
        .bind(order.video.as_deref())
        .bind(urgent)
        .bind(date)
        .bind(order.time)
        .bind(&order.phone)
        .bind(&order.address)
        .bind(order.description.as_deref())
        .bind(order.payment.as_str())
        .fetch_one(&self.pool)
        .await?;

        info!(order_id = id, chat_id = order.client_chat_id, "Order created");
        Ok(id)
    }

    async fn find(&self, id: i64) -> Result<Option<OrderRecord>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderRecord::try_from).transpose()
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<OrderRecord>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 ORDER BY created_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderRecord::try_from).collect()
    }

    async fn set_status(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn submit(&self, review: &NewReview) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO reviews (order_id, client_chat_id, rating, comment)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(review.order_id)
        .bind(review.client_chat_id)
        .bind(i16::from(review.rating))
        .bind(review.comment.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn has_review(&self, order_id: i64) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM reviews WHERE order_id = $1)")
                .bind(order_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

#[async_trait]
impl ReferralStore for PgStore {
    async fn register(
        &self,
        inviter_chat_id: i64,
        invitee_chat_id: i64,
    ) -> Result<bool, StoreError> {
        if inviter_chat_id == invitee_chat_id {
            return Ok(false);
        }

        let result = sqlx::query(
            "INSERT INTO referrals (inviter_chat_id, invitee_chat_id)
             VALUES ($1, $2)
             ON CONFLICT (invitee_chat_id) DO NOTHING",
        )
        .bind(inviter_chat_id)
        .bind(invitee_chat_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_invitees(&self, inviter_chat_id: i64) -> Result<Vec<ReferralRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ReferralRow>(
            "SELECT inviter_chat_id, invitee_chat_id, payout_requested
             FROM referrals WHERE inviter_chat_id = $1 ORDER BY created_at",
        )
        .bind(inviter_chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ReferralRecord {
                inviter_chat_id: row.inviter_chat_id,
                invitee_chat_id: row.invitee_chat_id,
                payout_requested: row.payout_requested,
            })
            .collect())
    }

    async fn request_payout(
        &self,
        inviter_chat_id: i64,
        invitee_chat_id: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE referrals SET payout_requested = TRUE
             WHERE inviter_chat_id = $1 AND invitee_chat_id = $2 AND NOT payout_requested",
        )
        .bind(inviter_chat_id)
        .bind(invitee_chat_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl StatsStore for PgStore {
    async fn stats(&self, period: StatsPeriod) -> Result<OrderStats, StoreError> {
        let (from, to) = match period.range(Local::now().date_naive()) {
            Some((from, to)) => (Some(from), Some(to)),
            None => (None, None),
        };

        let orders = sqlx::query_as::<_, OrderCountsRow>(
            "SELECT COUNT(*) AS total_orders,
                    COUNT(*) FILTER (WHERE category = 'waste_removal') AS waste_removal,
                    COUNT(*) FILTER (WHERE category = 'demolition') AS demolition,
                    COUNT(*) FILTER (WHERE category = 'construction_materials') AS construction_materials,
                    COUNT(*) FILTER (WHERE status = 'completed') AS completed
             FROM orders
             WHERE ($1::date IS NULL OR created_at::date >= $1)
               AND ($2::date IS NULL OR created_at::date <= $2)",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        let reviews = sqlx::query_as::<_, ReviewCountsRow>(
            "SELECT COUNT(*) AS reviews, AVG(rating)::float8 AS average_rating
             FROM reviews
             WHERE ($1::date IS NULL OR created_at::date >= $1)
               AND ($2::date IS NULL OR created_at::date <= $2)",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(OrderStats {
            total_orders: orders.total_orders,
            waste_removal: orders.waste_removal,
            demolition: orders.demolition,
            construction_materials: orders.construction_materials,
            completed: orders.completed,
            reviews: reviews.reviews,
            average_rating: reviews.average_rating,
        })
    }
}
