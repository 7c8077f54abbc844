/// Named message templates with `{placeholder}` substitution
use crate::{
    db::RentalRepository,
    error::{RentalError, RentalResult},
};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const RENTAL_START: &str = "rental_start";
pub const RENTAL_END: &str = "rental_end";
pub const RENTAL_FORCE_END: &str = "rental_force_end";
pub const ADMIN_RENTAL_START: &str = "admin_rental_start";
pub const ADMIN_RENTAL_END: &str = "admin_rental_end";
pub const CHECKOUT_FAILED: &str = "checkout_failed";

/// Every template name, in display order
pub const TEMPLATE_NAMES: [&str; 6] = [
    RENTAL_START,
    RENTAL_END,
    RENTAL_FORCE_END,
    ADMIN_RENTAL_START,
    ADMIN_RENTAL_END,
    CHECKOUT_FAILED,
];

/// Built-in text for a template name
pub fn default_template(name: &str) -> Option<&'static str> {
    let text = match name {
        RENTAL_START => concat!(
            "Steam account rental\n\n",
            "Login: {login}\n",
            "Password: {password}\n",
            "Type: {account_type}\n\n",
            "Duration: {duration_hours} h\n",
            "Ends at: {end_time}\n\n",
            "Important:\n",
            "- Access is revoked when the rental ends\n",
            "- The password will be changed\n",
            "- Do not change the password\n",
            "- Do not enable two-factor authentication"
        ),
        RENTAL_END => concat!(
            "Rental finished\n\n",
            "Your rental period has ended. Access was revoked and the password changed.\n",
            "Thank you for using our service!"
        ),
        RENTAL_FORCE_END => concat!(
            "Rental ended early\n\n",
            "The rental was ended by the administrator.\n",
            "Access was revoked and the password changed."
        ),
        ADMIN_RENTAL_START => concat!(
            "Account issued\n\n",
            "Order: #{order_id}\n",
            "Buyer: {username}\n",
            "Account: {login}\n",
            "Password: {password}\n",
            "Type: {account_type}\n",
            "Duration: {duration_hours} h\n",
            "Ends at: {end_time}"
        ),
        ADMIN_RENTAL_END => concat!(
            "Rental finished ({reason})\n\n",
            "User: {username}\n",
            "Account: {login}\n",
            "Type: {account_type}\n",
            "Account returned to the pool\n",
            "New password: {new_password}"
        ),
        CHECKOUT_FAILED => concat!(
            "Checkout failed\n\n",
            "Product: {product_name}\n",
            "Buyer: {username}\n\n",
            "Error: {reason}"
        ),
        _ => return None,
    };
    Some(text)
}

/// Replace every `{key}` with its value. Unknown placeholders and unmatched
/// braces are kept as written.
pub fn render_template(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replaced = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (value, close))
        });

        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Template as shown to administrators
#[derive(Debug, Clone, Serialize)]
pub struct TemplateView {
    pub name: String,
    pub body: String,
    pub is_custom: bool,
}

/// Defaults plus administrator overrides
pub struct MessageTemplates {
    custom: RwLock<HashMap<String, String>>,
    repo: Arc<dyn RentalRepository>,
}

impl MessageTemplates {
    pub async fn load(repo: Arc<dyn RentalRepository>) -> RentalResult<Self> {
        let mut custom = HashMap::new();
        for (name, body) in repo.load_templates().await? {
            if default_template(&name).is_some() {
                custom.insert(name, body);
            } else {
                warn!(template = %name, "Ignoring stored template with unknown name");
            }
        }

        Ok(Self {
            custom: RwLock::new(custom),
            repo,
        })
    }

    fn check_name(name: &str) -> RentalResult<&'static str> {
        default_template(name).ok_or_else(|| RentalError::NotFound(format!("Template {}", name)))
    }

    /// Current text of a template
    pub async fn get(&self, name: &str) -> RentalResult<String> {
        let default = Self::check_name(name)?;
        Ok(self
            .custom
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_else(|| default.to_string()))
    }

    pub async fn list(&self) -> Vec<TemplateView> {
        let custom = self.custom.read().await;
        TEMPLATE_NAMES
            .iter()
            .map(|name| match custom.get(*name) {
                Some(body) => TemplateView {
                    name: name.to_string(),
                    body: body.clone(),
                    is_custom: true,
                },
                None => TemplateView {
                    name: name.to_string(),
                    body: default_template(name).unwrap_or_default().to_string(),
                    is_custom: false,
                },
            })
            .collect()
    }

    /// Override a template
    pub async fn set(&self, name: &str, body: &str) -> RentalResult<()> {
        Self::check_name(name)?;
        if body.trim().is_empty() {
            return Err(RentalError::Validation("Template text cannot be empty".to_string()));
        }

        let mut custom = self.custom.write().await;
        self.repo.save_template(name, body, Utc::now()).await?;
        custom.insert(name.to_string(), body.to_string());

        info!(template = %name, "Template updated");
        Ok(())
    }

    /// Drop every override
    pub async fn reset(&self) -> RentalResult<()> {
        let mut custom = self.custom.write().await;
        self.repo.clear_templates().await?;
        custom.clear();

        info!("Templates reset to defaults");
        Ok(())
    }

    /// Render a template; a name without a template renders as empty text
    pub async fn render(&self, name: &str, vars: &[(&str, String)]) -> String {
        match self.get(name).await {
            Ok(template) => render_template(&template, vars),
            Err(e) => {
                warn!(template = %name, "Cannot render template: {}", e);
                String::new()
            }
        }
    }
}
