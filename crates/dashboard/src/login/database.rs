use std::{path::PathBuf, time::Duration};

use chrono::Utc;
use eyre::{eyre, Context, OptionExt};
use rand::SeedableRng;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, instrument};

use super::{SessionToken, UserId};
use crate::drive::{DrivePreferences, RewardTier};

#[derive(Debug, Clone)]
pub struct Settings {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Database {
    command_tx: mpsc::Sender<Command>,
}

/// A user's row as the drive preferences handler sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub reward_tier: RewardTier,
    pub drive: DrivePreferences,
    /// Bumped by every write to the drive preferences.
    pub drive_revision: i64,
}

enum Command {
    NewUser {
        reward_tier: RewardTier,
        reply: oneshot::Sender<eyre::Result<UserId>>,
    },
    SetRewardTier {
        user_id: UserId,
        reward_tier: RewardTier,
        reply: oneshot::Sender<eyre::Result<()>>,
    },
    NewSession {
        user_id: UserId,
        max_age: Duration,
        reply: oneshot::Sender<eyre::Result<SessionToken>>,
    },
    SessionUser {
        token: SessionToken,
        reply: oneshot::Sender<eyre::Result<Option<UserId>>>,
    },
    FindUser {
        user_id: UserId,
        reply: oneshot::Sender<eyre::Result<Option<UserRecord>>>,
    },
    UpdateDrive {
        user_id: UserId,
        drive: DrivePreferences,
        reply: oneshot::Sender<eyre::Result<()>>,
    },
}

impl Database {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<eyre::Result<T>>) -> Command,
    ) -> eyre::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(command(tx))
            .await
            .map_err(|_| eyre!("database is too contended"))?;
        rx.await.map_err(|_| eyre!("database is not available"))?
    }

    pub async fn new_user(&self, reward_tier: RewardTier) -> eyre::Result<UserId> {
        self.request(|reply| Command::NewUser { reward_tier, reply })
            .await
    }

    pub async fn set_reward_tier(
        &self,
        user_id: UserId,
        reward_tier: RewardTier,
    ) -> eyre::Result<()> {
        self.request(|reply| Command::SetRewardTier {
            user_id,
            reward_tier,
            reply,
        })
        .await
    }

    pub async fn new_session(
        &self,
        user_id: UserId,
        max_age: Duration,
    ) -> eyre::Result<SessionToken> {
        self.request(|reply| Command::NewSession {
            user_id,
            max_age,
            reply,
        })
        .await
    }

    /// Returns the owner of the session, provided it has not expired yet.
    pub async fn session_user(&self, token: SessionToken) -> eyre::Result<Option<UserId>> {
        self.request(|reply| Command::SessionUser { token, reply })
            .await
    }

    pub async fn find_user(&self, user_id: UserId) -> eyre::Result<Option<UserRecord>> {
        self.request(|reply| Command::FindUser { user_id, reply })
            .await
    }

    #[instrument(skip(self, user_id), fields(user_id = %user_id), err(Debug))]
    pub async fn update_drive(&self, user_id: UserId, drive: DrivePreferences) -> eyre::Result<()> {
        self.request(|reply| Command::UpdateDrive {
            user_id,
            drive,
            reply,
        })
        .await
    }
}

#[instrument(name = "login::database::start", skip(settings), fields(path = %settings.path.display()))]
pub fn start(settings: &Settings) -> eyre::Result<Database> {
    let db = Connection::open(&settings.path).context("cannot open login database")?;

    info!("initial setup");

    db.execute_batch(
        r#"
            CREATE TABLE IF NOT EXISTS
            t_users (
                user_index      INTEGER PRIMARY KEY,
                long_user_id    BLOB NOT NULL UNIQUE,
                reward_tier     INTEGER NOT NULL DEFAULT 0,
                drive_format    TEXT NOT NULL DEFAULT 'flac',
                drive_container TEXT NOT NULL DEFAULT 'zip',
                drive_enabled   INTEGER NOT NULL DEFAULT 0,
                drive_service   TEXT NOT NULL DEFAULT 'google',
                drive_revision  INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS
            t_sessions (
                session_index INTEGER PRIMARY KEY,
                token         BLOB NOT NULL UNIQUE,
                long_user_id  BLOB NOT NULL,
                expires_at    INTEGER NOT NULL
            );
        "#,
    )
    .context("cannot create login tables")?;

    let (command_tx, mut command_rx) = mpsc::channel(8);

    let mut rng = rand_chacha::ChaCha20Rng::from_entropy();

    tokio::task::spawn_blocking(move || {
        while let Some(command) = command_rx.blocking_recv() {
            match command {
                Command::NewUser { reward_tier, reply } => {
                    let user_id = UserId::new(&mut rng);
                    let result = db
                        .prepare_cached(
                            r#"
                                INSERT INTO t_users
                                (long_user_id, reward_tier)
                                VALUES (?, ?);
                            "#,
                        )
                        .and_then(|mut s| s.execute((user_id.0, reward_tier.0)))
                        .context("could not execute query");
                    _ = reply.send(result.map(|_| user_id));
                }

                Command::SetRewardTier {
                    user_id,
                    reward_tier,
                    reply,
                } => {
                    let result = db
                        .prepare_cached(
                            r#"
                                UPDATE t_users
                                SET reward_tier = ?
                                WHERE long_user_id = ?;
                            "#,
                        )
                        .and_then(|mut s| s.execute((reward_tier.0, user_id.0)))
                        .context("could not execute query")
                        .and_then(|changed| expect_one_row(changed, user_id));
                    _ = reply.send(result);
                }

                Command::NewSession {
                    user_id,
                    max_age,
                    reply,
                } => {
                    let token = SessionToken::new(&mut rng);
                    let expires_at = Utc::now().timestamp()
                        + i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX / 2);
                    let result = db
                        .prepare_cached(
                            r#"
                                INSERT INTO t_sessions
                                (token, long_user_id, expires_at)
                                VALUES (?, ?, ?);
                            "#,
                        )
                        .and_then(|mut s| s.execute((token.0, user_id.0, expires_at)))
                        .context("could not execute query");
                    _ = reply.send(result.map(|_| token));
                }

                Command::SessionUser { token, reply } => {
                    let result = db
                        .prepare_cached(
                            r#"
                                SELECT long_user_id
                                FROM t_sessions
                                WHERE token = ? AND expires_at > ?
                                LIMIT 1;
                            "#,
                        )
                        .and_then(|mut s| {
                            s.query_row((token.0, Utc::now().timestamp()), |row| {
                                row.get(0).map(UserId)
                            })
                            .optional()
                        })
                        .context("could not execute query");
                    _ = reply.send(result);
                }

                Command::FindUser { user_id, reply } => {
                    _ = reply.send(find_user(&db, user_id));
                }

                Command::UpdateDrive {
                    user_id,
                    drive,
                    reply,
                } => {
                    let result = db
                        .prepare_cached(
                            r#"
                                UPDATE t_users
                                SET drive_format    = ?,
                                    drive_container = ?,
                                    drive_enabled   = ?,
                                    drive_service   = ?,
                                    drive_revision  = drive_revision + 1
                                WHERE long_user_id = ?;
                            "#,
                        )
                        .and_then(|mut s| {
                            s.execute((
                                drive.format.as_str(),
                                drive.container.as_str(),
                                drive.enabled,
                                drive.service.as_str(),
                                user_id.0,
                            ))
                        })
                        .context("could not execute query")
                        .and_then(|changed| expect_one_row(changed, user_id));
                    _ = reply.send(result);
                }
            }
        }
    });

    Ok(Database { command_tx })
}

fn expect_one_row(changed: usize, user_id: UserId) -> eyre::Result<()> {
    if changed == 1 {
        Ok(())
    } else {
        Err(eyre!("user {user_id} does not exist"))
    }
}

fn find_user(db: &Connection, user_id: UserId) -> eyre::Result<Option<UserRecord>> {
    let row = db
        .prepare_cached(
            r#"
                SELECT reward_tier, drive_format, drive_container,
                       drive_enabled, drive_service, drive_revision
                FROM t_users
                WHERE long_user_id = ?
                LIMIT 1;
            "#,
        )?
        .query_row((user_id.0,), |row| {
            Ok((
                row.get::<_, i32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })
        .optional()
        .context("could not execute query")?;

    let Some((reward_tier, format, container, enabled, service, drive_revision)) = row else {
        return Ok(None);
    };

    let drive = DrivePreferences {
        format: format
            .parse()
            .ok()
            .ok_or_eyre("stored drive format is corrupted")?,
        container: container
            .parse()
            .ok()
            .ok_or_eyre("stored drive container is corrupted")?,
        enabled,
        service: service
            .parse()
            .ok()
            .ok_or_eyre("stored drive service is corrupted")?,
    };

    Ok(Some(UserRecord {
        user_id,
        reward_tier: RewardTier(reward_tier),
        drive,
        drive_revision,
    }))
}
