/// Multi-step conversation wizards
///
/// Each conversation holds at most one wizard. A wizard is a tagged state
/// machine; every input either advances it, keeps it in place with an error
/// prompt, or finishes it.
use crate::{
    account::NewAccount,
    binding::BindingResolver,
    error::{RentalError, RentalResult},
    manager::RentalManager,
    notify::MessageTemplates,
    rental::{check_duration_hours, MAX_RENTAL_HOURS},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const CANCEL_WORDS: [&str; 4] = ["cancel", "/cancel", "отмена", "/отмена"];
const NO_KEY_WORDS: [&str; 4] = ["-", "no", "none", "нет"];

/// Which wizard to start
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "wizard", rename_all = "snake_case")]
pub enum WizardKind {
    AddAccount,
    AddBinding,
    EditTemplate { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AddAccountStep {
    Login,
    Password {
        login: String,
    },
    Type {
        login: String,
        password: String,
    },
    ProviderKey {
        login: String,
        password: String,
        account_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AddBindingStep {
    Name,
    Type {
        product_name: String,
    },
    Duration {
        product_name: String,
        account_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Wizard {
    AddAccount(AddAccountStep),
    AddBinding(AddBindingStep),
    EditTemplate { name: String },
}

impl Wizard {
    fn state_tag(&self) -> &'static str {
        match self {
            Wizard::AddAccount(AddAccountStep::Login) => "add_account.login",
            Wizard::AddAccount(AddAccountStep::Password { .. }) => "add_account.password",
            Wizard::AddAccount(AddAccountStep::Type { .. }) => "add_account.type",
            Wizard::AddAccount(AddAccountStep::ProviderKey { .. }) => "add_account.provider_key",
            Wizard::AddBinding(AddBindingStep::Name) => "add_binding.name",
            Wizard::AddBinding(AddBindingStep::Type { .. }) => "add_binding.type",
            Wizard::AddBinding(AddBindingStep::Duration { .. }) => "add_binding.duration",
            Wizard::EditTemplate { .. } => "edit_template.text",
        }
    }
}

/// Answer to one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WizardReply {
    pub text: String,
    /// Current state, `None` once the wizard is over
    pub state: Option<&'static str>,
}

impl WizardReply {
    fn next(wizard: &Wizard, text: impl Into<String>) -> (Option<Wizard>, Self) {
        (
            Some(wizard.clone()),
            Self {
                text: text.into(),
                state: Some(wizard.state_tag()),
            },
        )
    }

    fn done(text: impl Into<String>) -> (Option<Wizard>, Self) {
        (
            None,
            Self {
                text: text.into(),
                state: None,
            },
        )
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_none()
    }
}

/// Wizard sessions keyed by conversation id
pub struct WizardSessions {
    sessions: Mutex<HashMap<String, Wizard>>,
    manager: Arc<RentalManager>,
    bindings: Arc<BindingResolver>,
    templates: Arc<MessageTemplates>,
}

impl WizardSessions {
    pub fn new(
        manager: Arc<RentalManager>,
        bindings: Arc<BindingResolver>,
        templates: Arc<MessageTemplates>,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            manager,
            bindings,
            templates,
        }
    }

    /// Start a wizard, replacing whatever the conversation was doing
    pub async fn start(&self, conversation_id: &str, kind: WizardKind) -> RentalResult<WizardReply> {
        let (wizard, prompt) = match kind {
            WizardKind::AddAccount => (
                Wizard::AddAccount(AddAccountStep::Login),
                "Send the account login.".to_string(),
            ),
            WizardKind::AddBinding => (
                Wizard::AddBinding(AddBindingStep::Name),
                "Send the exact product name as it appears on the marketplace.".to_string(),
            ),
            WizardKind::EditTemplate { name } => {
                let current = self.templates.get(&name).await?;
                (
                    Wizard::EditTemplate { name },
                    format!("Current text:\n\n{}\n\nSend the new text.", current),
                )
            }
        };

        let (_, reply) = WizardReply::next(&wizard, prompt);
        debug!(conversation = %conversation_id, state = wizard.state_tag(), "Wizard started");
        self.sessions
            .lock()
            .await
            .insert(conversation_id.to_string(), wizard);
        Ok(reply)
    }

    pub async fn is_active(&self, conversation_id: &str) -> bool {
        self.sessions.lock().await.contains_key(conversation_id)
    }

    /// Feed one message to the conversation's wizard
    pub async fn handle_input(&self, conversation_id: &str, text: &str) -> RentalResult<WizardReply> {
        let mut sessions = self.sessions.lock().await;
        let wizard = sessions.remove(conversation_id).ok_or_else(|| {
            RentalError::NotFound(format!("No wizard for conversation {}", conversation_id))
        })?;

        let text = text.trim();
        if CANCEL_WORDS.contains(&text.to_lowercase().as_str()) {
            debug!(conversation = %conversation_id, "Wizard cancelled");
            return Ok(WizardReply::done("Cancelled.").1);
        }

        let (next, reply) = match wizard {
            Wizard::AddAccount(step) => self.add_account_step(step, text).await,
            Wizard::AddBinding(step) => self.add_binding_step(step, text).await,
            Wizard::EditTemplate { name } => self.edit_template_step(name, text).await,
        };

        if let Some(next) = next {
            sessions.insert(conversation_id.to_string(), next);
        }
        Ok(reply)
    }

    async fn add_account_step(&self, step: AddAccountStep, text: &str) -> (Option<Wizard>, WizardReply) {
        let current = Wizard::AddAccount(step.clone());
        match step {
            AddAccountStep::Login => {
                if text.is_empty() {
                    return WizardReply::next(&current, "The login cannot be empty.");
                }
                if self.manager.get_account(text).await.is_some() {
                    return WizardReply::next(
                        &current,
                        "An account with this login already exists. Send another login.",
                    );
                }
                WizardReply::next(
                    &Wizard::AddAccount(AddAccountStep::Password {
                        login: text.to_string(),
                    }),
                    "Login saved. Send the password.",
                )
            }
            AddAccountStep::Password { login } => {
                if text.is_empty() {
                    return WizardReply::next(&current, "The password cannot be empty.");
                }
                WizardReply::next(
                    &Wizard::AddAccount(AddAccountStep::Type {
                        login,
                        password: text.to_string(),
                    }),
                    "Password saved. Send the account type (for example: standard, pubg, repo).",
                )
            }
            AddAccountStep::Type { login, password } => {
                let account_type = if text.is_empty() {
                    "standard".to_string()
                } else {
                    text.to_lowercase()
                };
                WizardReply::next(
                    &Wizard::AddAccount(AddAccountStep::ProviderKey {
                        login,
                        password,
                        account_type,
                    }),
                    "Type saved. Send the provider API key, or \"-\" if there is none.",
                )
            }
            AddAccountStep::ProviderKey {
                login,
                password,
                account_type,
            } => {
                let provider_credential = if text.is_empty()
                    || NO_KEY_WORDS.contains(&text.to_lowercase().as_str())
                {
                    None
                } else {
                    Some(text.to_string())
                };
                let has_key = provider_credential.is_some();

                let result = self
                    .manager
                    .add_account(NewAccount {
                        login,
                        password,
                        account_type,
                        provider_credential,
                    })
                    .await;

                match result {
                    Ok(account) => WizardReply::done(format!(
                        "Account added.\n\nLogin: {}\nType: {}\nAPI key: {}",
                        account.login,
                        account.account_type,
                        if has_key { "set" } else { "none" }
                    )),
                    Err(e) => WizardReply::done(format!("Could not add the account: {}", e)),
                }
            }
        }
    }

    async fn add_binding_step(&self, step: AddBindingStep, text: &str) -> (Option<Wizard>, WizardReply) {
        let current = Wizard::AddBinding(step.clone());
        match step {
            AddBindingStep::Name => {
                if text.is_empty() {
                    return WizardReply::next(&current, "The product name cannot be empty.");
                }
                if self.bindings.contains(text).await {
                    return WizardReply::done(format!(
                        "Product \"{}\" is already bound. Remove the binding first.",
                        text
                    ));
                }
                WizardReply::next(
                    &Wizard::AddBinding(AddBindingStep::Type {
                        product_name: text.to_string(),
                    }),
                    "Product saved. Send the account type to issue for it.",
                )
            }
            AddBindingStep::Type { product_name } => {
                if text.is_empty() {
                    return WizardReply::next(&current, "The account type cannot be empty.");
                }
                WizardReply::next(
                    &Wizard::AddBinding(AddBindingStep::Duration {
                        product_name,
                        account_type: text.to_string(),
                    }),
                    "Type saved. Send the rental duration in hours.",
                )
            }
            AddBindingStep::Duration {
                product_name,
                account_type,
            } => {
                let hours = match text.parse::<i64>() {
                    Ok(hours) if check_duration_hours(hours).is_ok() => hours,
                    _ => {
                        return WizardReply::next(
                            &current,
                            format!(
                                "The duration must be a whole number of hours from 1 to {}.",
                                MAX_RENTAL_HOURS
                            ),
                        )
                    }
                };

                match self.bindings.bind(&product_name, &account_type, hours).await {
                    Ok(binding) => WizardReply::done(format!(
                        "Binding created.\n\nProduct: {}\nType: {}\nDuration: {} h",
                        binding.product_name, binding.account_type, binding.duration_hours
                    )),
                    Err(e) => WizardReply::done(format!("Could not create the binding: {}", e)),
                }
            }
        }
    }

    async fn edit_template_step(&self, name: String, text: &str) -> (Option<Wizard>, WizardReply) {
        match self.templates.set(&name, text).await {
            Ok(()) => WizardReply::done(format!("Template {} updated.", name)),
            Err(RentalError::Validation(reason)) => {
                WizardReply::next(&Wizard::EditTemplate { name }, reason)
            }
            Err(e) => WizardReply::done(format!("Could not update the template: {}", e)),
        }
    }
}
