//! User database operations (identity lookups for patients and doctors).

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{Role, User};

impl Database {
    /// Insert a new user. Fails with `Constraint` if the email is taken.
    pub fn insert_user(&self, user: &User) -> DbResult<()> {
        let result = self.conn.execute(
            r#"
            INSERT INTO users (user_id, role, name, email, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                user.user_id,
                user.role.as_str(),
                user.name,
                user.email,
                user.created_at,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = DbError::from(e);
                if err.is_constraint_violation() {
                    Err(DbError::Constraint(format!("User already exists: {}", user.email)))
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Get a user by ID.
    pub fn get_user(&self, user_id: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                r#"
                SELECT user_id, role, name, email, created_at
                FROM users
                WHERE user_id = ?
                "#,
                [user_id],
                read_user_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a user by email.
    pub fn get_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                r#"
                SELECT user_id, role, name, email, created_at
                FROM users
                WHERE email = ?
                "#,
                [email],
                read_user_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List users with the given role, by name.
    pub fn list_users_by_role(&self, role: Role) -> DbResult<Vec<User>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT user_id, role, name, email, created_at
            FROM users
            WHERE role = ?
            ORDER BY name
            "#,
        )?;

        let rows = stmt.query_map([role.as_str()], read_user_row)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?.try_into()?);
        }
        Ok(users)
    }
}

/// Intermediate row struct for database mapping.
struct UserRow {
    user_id: String,
    role: String,
    name: String,
    email: String,
    created_at: String,
}

fn read_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        user_id: row.get(0)?,
        role: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            user_id: row.user_id,
            role: string_to_role(&row.role)?,
            name: row.name,
            email: row.email,
            created_at: row.created_at,
        })
    }
}

fn string_to_role(s: &str) -> Result<Role, DbError> {
    match s {
        "patient" => Ok(Role::Patient),
        "doctor" => Ok(Role::Doctor),
        _ => Err(DbError::Constraint(format!("Unknown user role: {}", s))),
    }
}
