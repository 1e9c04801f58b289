use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::models::{
    CreateRideEventRequest, CreateRideRequest, CreateUserRequest, Ride, RideEvent, RideStatus,
    RideWithParties, UpdateRideEventRequest, UpdateRideRequest, UpdateUserRequest, User, UserRole,
};
use crate::services::geo::EARTH_RADIUS_KM;

use super::{
    RideEventFilter, RideEventOrdering, RideEventStore, RideFilter, RideOrdering, RideStore,
    StoreError, UserFilter, UserOrdering, UserStore,
};

const RIDE_SELECT_SQL: &str = "SELECT r.id, r.status, r.rider_id, r.driver_id, \
     r.pickup_latitude, r.pickup_longitude, r.dropoff_latitude, r.dropoff_longitude, \
     r.pickup_time, \
     ru.id AS rider_user_id, ru.role AS rider_role, ru.first_name AS rider_first_name, \
     ru.last_name AS rider_last_name, ru.email AS rider_email, \
     ru.phone_number AS rider_phone_number, \
     du.id AS driver_user_id, du.role AS driver_role, du.first_name AS driver_first_name, \
     du.last_name AS driver_last_name, du.email AS driver_email, \
     du.phone_number AS driver_phone_number \
     FROM rides r \
     JOIN users ru ON ru.id = r.rider_id \
     JOIN users du ON du.id = r.driver_id";

const RIDE_COUNT_SQL: &str =
    "SELECT COUNT(*) FROM rides r JOIN users ru ON ru.id = r.rider_id";

/// Flattened ride row with both party records joined in.
#[derive(Debug, FromRow)]
struct RideRow {
    id: i64,
    status: RideStatus,
    rider_id: i64,
    driver_id: i64,
    pickup_latitude: f64,
    pickup_longitude: f64,
    dropoff_latitude: f64,
    dropoff_longitude: f64,
    pickup_time: DateTime<Utc>,
    rider_user_id: i64,
    rider_role: UserRole,
    rider_first_name: String,
    rider_last_name: String,
    rider_email: String,
    rider_phone_number: String,
    driver_user_id: i64,
    driver_role: UserRole,
    driver_first_name: String,
    driver_last_name: String,
    driver_email: String,
    driver_phone_number: String,
}

impl From<RideRow> for RideWithParties {
    fn from(row: RideRow) -> Self {
        RideWithParties {
            ride: Ride {
                id: row.id,
                status: row.status,
                rider_id: row.rider_id,
                driver_id: row.driver_id,
                pickup_latitude: row.pickup_latitude,
                pickup_longitude: row.pickup_longitude,
                dropoff_latitude: row.dropoff_latitude,
                dropoff_longitude: row.dropoff_longitude,
                pickup_time: row.pickup_time,
            },
            rider: User {
                id: row.rider_user_id,
                role: row.rider_role,
                first_name: row.rider_first_name,
                last_name: row.rider_last_name,
                email: row.rider_email,
                phone_number: row.rider_phone_number,
            },
            driver: User {
                id: row.driver_user_id,
                role: row.driver_role,
                first_name: row.driver_first_name,
                last_name: row.driver_last_name,
                email: row.driver_email,
                phone_number: row.driver_phone_number,
            },
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_) => StoreError::Unavailable(err.to_string()),
        _ => StoreError::Query(err.to_string()),
    }
}

fn constraint_of(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.constraint().map(str::to_owned),
        _ => None,
    }
}

fn map_user_write_err(err: sqlx::Error, email: Option<&str>) -> StoreError {
    match (constraint_of(&err).as_deref(), email) {
        (Some("users_email_key"), Some(email)) => StoreError::DuplicateEmail(email.to_owned()),
        _ => map_sqlx(err),
    }
}

fn map_ride_write_err(
    err: sqlx::Error,
    rider_id: Option<i64>,
    driver_id: Option<i64>,
) -> StoreError {
    match (constraint_of(&err).as_deref(), rider_id, driver_id) {
        (Some("rides_rider_id_fkey"), Some(id), _) => StoreError::MissingUser(id),
        (Some("rides_driver_id_fkey"), _, Some(id)) => StoreError::MissingUser(id),
        _ => map_sqlx(err),
    }
}

/// Escapes LIKE metacharacters and wraps the fragment for a substring match.
fn like_pattern(fragment: &str) -> String {
    let escaped = fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn ride_where_clause(filter: &RideFilter, param_count: &mut i32) -> String {
    let mut clauses = Vec::new();
    if filter.status.is_some() {
        *param_count += 1;
        // Compared as text so an unknown literal matches zero rows instead
        // of failing the cast to ride_status.
        clauses.push(format!("r.status::text = ${}", param_count));
    }
    if filter.rider_email.is_some() {
        *param_count += 1;
        clauses.push(format!("ru.email ILIKE ${}", param_count));
    }

    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn ride_order_clause(ordering: &RideOrdering, param_count: &mut i32) -> String {
    match ordering {
        RideOrdering::PickupTimeAsc => " ORDER BY r.pickup_time ASC, r.id ASC".to_string(),
        RideOrdering::PickupTimeDesc => " ORDER BY r.pickup_time DESC, r.id ASC".to_string(),
        RideOrdering::Distance { .. } => {
            *param_count += 1;
            let lat = *param_count;
            *param_count += 1;
            let lon = *param_count;
            format!(
                " ORDER BY acos(least(1.0, greatest(-1.0, \
                 sin(radians(${0})) * sin(radians(r.pickup_latitude)) + \
                 cos(radians(${0})) * cos(radians(r.pickup_latitude)) * \
                 cos(radians(r.pickup_longitude) - radians(${1}))))) * {2} ASC, r.id ASC",
                lat, lon, EARTH_RADIUS_KM
            )
        }
    }
}

#[async_trait]
impl RideStore for PgStore {
    async fn ride_page(
        &self,
        filter: &RideFilter,
        ordering: &RideOrdering,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RideWithParties>, StoreError> {
        let mut query = String::from(RIDE_SELECT_SQL);
        let mut param_count = 0;
        query.push_str(&ride_where_clause(filter, &mut param_count));
        query.push_str(&ride_order_clause(ordering, &mut param_count));
        query.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));

        let mut query_builder = sqlx::query_as::<_, RideRow>(&query);
        if let Some(status) = &filter.status {
            query_builder = query_builder.bind(status.clone());
        }
        if let Some(email) = &filter.rider_email {
            query_builder = query_builder.bind(like_pattern(email));
        }
        if let RideOrdering::Distance {
            latitude,
            longitude,
        } = ordering
        {
            query_builder = query_builder.bind(*latitude).bind(*longitude);
        }

        let rows = query_builder
            .fetch_all(&self.db)
            .await
            .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(RideWithParties::from).collect())
    }

    async fn count_rides(&self, filter: &RideFilter) -> Result<i64, StoreError> {
        let mut query = String::from(RIDE_COUNT_SQL);
        let mut param_count = 0;
        query.push_str(&ride_where_clause(filter, &mut param_count));

        let mut query_builder = sqlx::query_scalar::<_, i64>(&query);
        if let Some(status) = &filter.status {
            query_builder = query_builder.bind(status.clone());
        }
        if let Some(email) = &filter.rider_email {
            query_builder = query_builder.bind(like_pattern(email));
        }

        query_builder.fetch_one(&self.db).await.map_err(map_sqlx)
    }

    async fn ride_by_id(&self, id: i64) -> Result<Option<RideWithParties>, StoreError> {
        let query = format!("{} WHERE r.id = $1", RIDE_SELECT_SQL);
        let row = sqlx::query_as::<_, RideRow>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(RideWithParties::from))
    }

    async fn events_since(
        &self,
        ride_ids: &[i64],
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RideEvent>, StoreError> {
        sqlx::query_as::<_, RideEvent>(
            "SELECT id, ride_id, description, created_at FROM ride_events \
             WHERE ride_id = ANY($1) AND created_at >= $2 \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(ride_ids.to_vec())
        .bind(cutoff)
        .fetch_all(&self.db)
        .await
        .map_err(map_sqlx)
    }

    async fn events_for_ride(&self, ride_id: i64) -> Result<Vec<RideEvent>, StoreError> {
        sqlx::query_as::<_, RideEvent>(
            "SELECT id, ride_id, description, created_at FROM ride_events \
             WHERE ride_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(ride_id)
        .fetch_all(&self.db)
        .await
        .map_err(map_sqlx)
    }

    async fn create_ride(&self, request: CreateRideRequest) -> Result<Ride, StoreError> {
        sqlx::query_as::<_, Ride>(
            "INSERT INTO rides (status, rider_id, driver_id, pickup_latitude, pickup_longitude, \
             dropoff_latitude, dropoff_longitude, pickup_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, status, rider_id, driver_id, pickup_latitude, pickup_longitude, \
             dropoff_latitude, dropoff_longitude, pickup_time",
        )
        .bind(request.status)
        .bind(request.rider_id)
        .bind(request.driver_id)
        .bind(request.pickup_latitude)
        .bind(request.pickup_longitude)
        .bind(request.dropoff_latitude)
        .bind(request.dropoff_longitude)
        .bind(request.pickup_time)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_ride_write_err(e, Some(request.rider_id), Some(request.driver_id)))
    }

    async fn update_ride(
        &self,
        id: i64,
        request: UpdateRideRequest,
    ) -> Result<Option<Ride>, StoreError> {
        sqlx::query_as::<_, Ride>(
            "UPDATE rides SET \
             status = COALESCE($2, status), \
             rider_id = COALESCE($3, rider_id), \
             driver_id = COALESCE($4, driver_id), \
             pickup_latitude = COALESCE($5, pickup_latitude), \
             pickup_longitude = COALESCE($6, pickup_longitude), \
             dropoff_latitude = COALESCE($7, dropoff_latitude), \
             dropoff_longitude = COALESCE($8, dropoff_longitude), \
             pickup_time = COALESCE($9, pickup_time) \
             WHERE id = $1 \
             RETURNING id, status, rider_id, driver_id, pickup_latitude, pickup_longitude, \
             dropoff_latitude, dropoff_longitude, pickup_time",
        )
        .bind(id)
        .bind(request.status)
        .bind(request.rider_id)
        .bind(request.driver_id)
        .bind(request.pickup_latitude)
        .bind(request.pickup_longitude)
        .bind(request.dropoff_latitude)
        .bind(request.dropoff_longitude)
        .bind(request.pickup_time)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_ride_write_err(e, request.rider_id, request.driver_id))
    }

    async fn delete_ride(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM rides WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, request: CreateUserRequest) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (role, first_name, last_name, email, phone_number) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, role, first_name, last_name, email, phone_number",
        )
        .bind(request.role)
        .bind(request.first_name.clone())
        .bind(request.last_name.clone())
        .bind(request.email.clone())
        .bind(request.phone_number.clone())
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_user_write_err(e, Some(&request.email)))
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT id, role, first_name, last_name, email, phone_number FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_sqlx)
    }

    async fn update_user(
        &self,
        id: i64,
        request: UpdateUserRequest,
    ) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET \
             role = COALESCE($2, role), \
             first_name = COALESCE($3, first_name), \
             last_name = COALESCE($4, last_name), \
             email = COALESCE($5, email), \
             phone_number = COALESCE($6, phone_number) \
             WHERE id = $1 \
             RETURNING id, role, first_name, last_name, email, phone_number",
        )
        .bind(id)
        .bind(request.role)
        .bind(request.first_name.clone())
        .bind(request.last_name.clone())
        .bind(request.email.clone())
        .bind(request.phone_number.clone())
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_user_write_err(e, request.email.as_deref()))
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        // Rides referencing the user and their events go with it via
        // ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_page(
        &self,
        filter: &UserFilter,
        ordering: UserOrdering,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, StoreError> {
        let mut query = String::from(
            "SELECT id, role, first_name, last_name, email, phone_number FROM users",
        );
        if filter.search.is_some() {
            query.push_str(" WHERE email ILIKE $1 OR first_name ILIKE $1 OR last_name ILIKE $1");
        }
        let order = match ordering {
            UserOrdering::IdAsc => "id ASC",
            UserOrdering::IdDesc => "id DESC",
            UserOrdering::EmailAsc => "email ASC, id ASC",
            UserOrdering::EmailDesc => "email DESC, id ASC",
            UserOrdering::RoleAsc => "role ASC, id ASC",
            UserOrdering::RoleDesc => "role DESC, id ASC",
        };
        query.push_str(&format!(" ORDER BY {} LIMIT {} OFFSET {}", order, limit, offset));

        let mut query_builder = sqlx::query_as::<_, User>(&query);
        if let Some(term) = &filter.search {
            query_builder = query_builder.bind(like_pattern(term));
        }

        query_builder.fetch_all(&self.db).await.map_err(map_sqlx)
    }

    async fn count_users(&self, filter: &UserFilter) -> Result<i64, StoreError> {
        let mut query = String::from("SELECT COUNT(*) FROM users");
        if filter.search.is_some() {
            query.push_str(" WHERE email ILIKE $1 OR first_name ILIKE $1 OR last_name ILIKE $1");
        }

        let mut query_builder = sqlx::query_scalar::<_, i64>(&query);
        if let Some(term) = &filter.search {
            query_builder = query_builder.bind(like_pattern(term));
        }

        query_builder.fetch_one(&self.db).await.map_err(map_sqlx)
    }
}

#[async_trait]
impl RideEventStore for PgStore {
    async fn create_event(&self, request: CreateRideEventRequest) -> Result<RideEvent, StoreError> {
        sqlx::query_as::<_, RideEvent>(
            "INSERT INTO ride_events (ride_id, description) VALUES ($1, $2) \
             RETURNING id, ride_id, description, created_at",
        )
        .bind(request.ride_id)
        .bind(request.description.clone())
        .fetch_one(&self.db)
        .await
        .map_err(|e| match constraint_of(&e).as_deref() {
            Some("ride_events_ride_id_fkey") => StoreError::MissingRide(request.ride_id),
            _ => map_sqlx(e),
        })
    }

    async fn event_by_id(&self, id: i64) -> Result<Option<RideEvent>, StoreError> {
        sqlx::query_as::<_, RideEvent>(
            "SELECT id, ride_id, description, created_at FROM ride_events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_sqlx)
    }

    async fn update_event(
        &self,
        id: i64,
        request: UpdateRideEventRequest,
    ) -> Result<Option<RideEvent>, StoreError> {
        sqlx::query_as::<_, RideEvent>(
            "UPDATE ride_events SET description = COALESCE($2, description) \
             WHERE id = $1 RETURNING id, ride_id, description, created_at",
        )
        .bind(id)
        .bind(request.description.clone())
        .fetch_optional(&self.db)
        .await
        .map_err(map_sqlx)
    }

    async fn delete_event(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM ride_events WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn event_page(
        &self,
        filter: &RideEventFilter,
        ordering: RideEventOrdering,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RideEvent>, StoreError> {
        let mut query =
            String::from("SELECT id, ride_id, description, created_at FROM ride_events");
        let mut param_count = 0;
        let mut clauses = Vec::new();
        if filter.ride_id.is_some() {
            param_count += 1;
            clauses.push(format!("ride_id = ${}", param_count));
        }
        if filter.description.is_some() {
            param_count += 1;
            clauses.push(format!("description = ${}", param_count));
        }
        if !clauses.is_empty() {
            query.push_str(&format!(" WHERE {}", clauses.join(" AND ")));
        }
        let order = match ordering {
            RideEventOrdering::CreatedAtAsc => "created_at ASC, id ASC",
            RideEventOrdering::CreatedAtDesc => "created_at DESC, id DESC",
        };
        query.push_str(&format!(" ORDER BY {} LIMIT {} OFFSET {}", order, limit, offset));

        let mut query_builder = sqlx::query_as::<_, RideEvent>(&query);
        if let Some(ride_id) = filter.ride_id {
            query_builder = query_builder.bind(ride_id);
        }
        if let Some(description) = &filter.description {
            query_builder = query_builder.bind(description.clone());
        }

        query_builder.fetch_all(&self.db).await.map_err(map_sqlx)
    }

    async fn count_events(&self, filter: &RideEventFilter) -> Result<i64, StoreError> {
        let mut query = String::from("SELECT COUNT(*) FROM ride_events");
        let mut param_count = 0;
        let mut clauses = Vec::new();
        if filter.ride_id.is_some() {
            param_count += 1;
            clauses.push(format!("ride_id = ${}", param_count));
        }
        if filter.description.is_some() {
            param_count += 1;
            clauses.push(format!("description = ${}", param_count));
        }
        if !clauses.is_empty() {
            query.push_str(&format!(" WHERE {}", clauses.join(" AND ")));
        }

        let mut query_builder = sqlx::query_scalar::<_, i64>(&query);
        if let Some(ride_id) = filter.ride_id {
            query_builder = query_builder.bind(ride_id);
        }
        if let Some(description) = &filter.description {
            query_builder = query_builder.bind(description.clone());
        }

        query_builder.fetch_one(&self.db).await.map_err(map_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("alice"), "%alice%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("back\\slash"), "%back\\\\slash%");
    }

    #[test]
    fn test_where_clause_numbers_parameters_in_bind_order() {
        let mut param_count = 0;
        let clause = ride_where_clause(
            &RideFilter::from_params(Some("pickup"), Some("alice")),
            &mut param_count,
        );
        assert_eq!(
            clause,
            " WHERE r.status::text = $1 AND ru.email ILIKE $2"
        );
        assert_eq!(param_count, 2);
    }

    #[test]
    fn test_where_clause_is_empty_without_filters() {
        let mut param_count = 0;
        let clause = ride_where_clause(&RideFilter::default(), &mut param_count);
        assert_eq!(clause, "");
        assert_eq!(param_count, 0);
    }

    #[test]
    fn test_distance_order_clause_continues_parameter_numbering() {
        let mut param_count = 2;
        let clause = ride_order_clause(
            &RideOrdering::Distance {
                latitude: 14.44,
                longitude: 121.04,
            },
            &mut param_count,
        );
        assert!(clause.contains("radians($3)"), "clause: {clause}");
        assert!(clause.contains("radians($4)"), "clause: {clause}");
        assert!(clause.ends_with("ASC, r.id ASC"));
        assert_eq!(param_count, 4);
    }

    #[test]
    fn test_time_order_clauses_do_not_consume_parameters() {
        let mut param_count = 1;
        let asc = ride_order_clause(&RideOrdering::PickupTimeAsc, &mut param_count);
        assert_eq!(asc, " ORDER BY r.pickup_time ASC, r.id ASC");
        let desc = ride_order_clause(&RideOrdering::PickupTimeDesc, &mut param_count);
        assert_eq!(desc, " ORDER BY r.pickup_time DESC, r.id ASC");
        assert_eq!(param_count, 1);
    }
}
