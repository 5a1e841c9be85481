//! Shared test domain: a user aggregate with its events and commands.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chronicle_core::aggregate::Aggregate;
use chronicle_core::command::{Command, CommandHandler, Dispatcher};
use chronicle_core::context::Context;
use chronicle_core::error::BoxError;
use chronicle_core::epoch::EpochMillis;
use chronicle_core::event::Model;
use chronicle_core::repository::Repository;
use chronicle_core::store::Store;
use chronicle_core::{event_set, impl_event};
use serde::{Deserialize, Serialize};

/// Emitted when a user is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserCreated {
    pub model: Model,
    pub name: String,
    pub email: String,
}

impl_event!(UserCreated, model = model);

/// Emitted when a user changes their email address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailChanged {
    pub model: Model,
    pub email: String,
}

impl_event!(EmailChanged, model = model);

/// Emitted when a user is archived. `User` does not fold it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserArchived {
    pub model: Model,
}

impl_event!(UserArchived, model = model);

event_set! {
    #[derive(Debug, Clone, PartialEq)]
    pub enum UserEvent {
        Created(UserCreated),
        EmailChanged(EmailChanged),
        Archived(UserArchived),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: String,
    pub version: i64,
    pub name: String,
    pub email: String,
}

impl Aggregate for User {
    type Event = UserEvent;

    fn apply(&mut self, event: &UserEvent) -> bool {
        match event {
            UserEvent::Created(e) => {
                self.id.clone_from(&e.model.id);
                self.name.clone_from(&e.name);
                self.email.clone_from(&e.email);
                self.version = e.model.version;
                true
            }
            UserEvent::EmailChanged(e) => {
                self.email.clone_from(&e.email);
                self.version = e.model.version;
                true
            }
            UserEvent::Archived(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum UserCommand {
    Create { id: String, name: String, email: String },
    ChangeEmail { id: String, email: String },
    Archive { id: String },
}

impl UserCommand {
    pub fn create(id: &str, name: &str, email: &str) -> Self {
        Self::Create {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }

    pub fn change_email(id: &str, email: &str) -> Self {
        Self::ChangeEmail {
            id: id.into(),
            email: email.into(),
        }
    }
}

impl Command for UserCommand {
    fn aggregate_id(&self) -> &str {
        match self {
            Self::Create { id, .. } | Self::ChangeEmail { id, .. } | Self::Archive { id } => id,
        }
    }

    fn is_constructor(&self) -> bool {
        matches!(self, Self::Create { .. })
    }

    fn command_type(&self) -> &'static str {
        match self {
            Self::Create { .. } => "CreateUser",
            Self::ChangeEmail { .. } => "ChangeEmail",
            Self::Archive { .. } => "ArchiveUser",
        }
    }
}

#[async_trait]
impl CommandHandler<UserCommand> for User {
    fn handles(&self, command: &UserCommand) -> bool {
        !matches!(command, UserCommand::Archive { .. })
    }

    async fn handle(&self, ctx: &Context, command: &UserCommand) -> Result<Vec<UserEvent>, BoxError> {
        match command {
            UserCommand::Create { id, name, email } => Ok(vec![
                UserCreated {
                    model: Model::new(id.as_str(), 1, ctx.now()),
                    name: name.clone(),
                    email: email.clone(),
                }
                .into(),
            ]),
            UserCommand::ChangeEmail { id, email } => {
                if email.is_empty() {
                    return Err("email must not be empty".into());
                }
                Ok(vec![
                    EmailChanged {
                        model: Model::new(id.as_str(), self.version + 1, ctx.now()),
                        email: email.clone(),
                    }
                    .into(),
                ])
            }
            UserCommand::Archive { .. } => Err("archiving is not supported".into()),
        }
    }
}

/// A repository over `store` with every user event bound.
pub fn repository(store: Arc<dyn Store>) -> Repository<User> {
    let mut repository = Repository::new(store);
    repository
        .bind(UserEvent::bindings())
        .expect("user events bind once");
    repository
}

pub fn dispatcher(store: Arc<dyn Store>) -> Dispatcher<User, UserCommand> {
    Dispatcher::new(Arc::new(repository(store)))
}

pub fn created(id: &str, version: i64) -> UserEvent {
    UserCreated {
        model: Model::new(id, version, EpochMillis(1_000)),
        name: "Jo".into(),
        email: "j@x".into(),
    }
    .into()
}

pub fn email_changed(id: &str, version: i64, email: &str) -> UserEvent {
    EmailChanged {
        model: Model::new(id, version, EpochMillis(2_000 + version)),
        email: email.into(),
    }
    .into()
}
