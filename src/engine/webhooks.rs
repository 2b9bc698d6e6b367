//! Webhook Hazard Detector
//!
//! An admission webhook whose backing Service is gone, or lives in a
//! namespace that is itself terminating, times out every admission call it
//! intercepts, including the deletes this tool issues.

use super::providers::STORAGE_WEBHOOK_TOKENS;
use crate::k8s::{ClientError, ClusterClient, ServiceRef, WebhookConfiguration, WebhookKind};
use colored::Colorize;
use std::fmt;

/// What to do with a hazardous webhook configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalPolicy {
    Auto,
    /// Ask on the terminal for each one
    Prompt,
    /// Report only
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HazardReason {
    ServiceMissing(ServiceRef),
    ServiceLookupFailed { service: ServiceRef, error: String },
    NamespaceTerminating(String),
}

impl fmt::Display for HazardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HazardReason::ServiceMissing(svc) => write!(f, "service {} not found", svc),
            HazardReason::ServiceLookupFailed { service, error } => {
                write!(f, "service {} could not be read: {}", service, error)
            }
            HazardReason::NamespaceTerminating(ns) => write!(f, "namespace {} is terminating", ns),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookHazard {
    pub kind: WebhookKind,
    pub name: String,
    pub reason: HazardReason,
    /// Storage provider token found in the configuration name
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookSummary {
    pub found: usize,
    pub removed: usize,
    /// Removed configurations that belong to a storage provider
    pub providers_removed: usize,
    pub hazards: Vec<WebhookHazard>,
}

/// First hazard among the services a configuration calls, if any
async fn classify(client: &dyn ClusterClient, config: &WebhookConfiguration) -> Option<HazardReason> {
    for service in &config.services {
        match client.service_exists(&service.namespace, &service.name).await {
            Ok(false) => return Some(HazardReason::ServiceMissing(service.clone())),
            Err(e) if !e.is_not_found() => {
                return Some(HazardReason::ServiceLookupFailed {
                    service: service.clone(),
                    error: e.to_string(),
                });
            }
            Err(_) => return Some(HazardReason::ServiceMissing(service.clone())),
            Ok(true) => {}
        }
        if let Ok(Some(ns)) = client.get_namespace(&service.namespace).await
            && ns.is_terminating()
        {
            return Some(HazardReason::NamespaceTerminating(service.namespace.clone()));
        }
    }
    None
}

fn provider_tokens(extra_patterns: &[String]) -> Vec<String> {
    STORAGE_WEBHOOK_TOKENS
        .iter()
        .map(|t| t.to_string())
        .chain(extra_patterns.iter().map(|p| p.to_lowercase()))
        .collect()
}

fn provider_token(name: &str, tokens: &[String]) -> Option<String> {
    let name = name.to_lowercase();
    tokens
        .iter()
        .find(|t| !t.is_empty() && name.contains(t.as_str()))
        .cloned()
}

/// Hazardous webhook configurations. `extra_patterns` extends the built-in
/// storage provider tokens used to label them.
pub async fn find_hazards(
    client: &dyn ClusterClient,
    extra_patterns: &[String],
) -> Result<Vec<WebhookHazard>, ClientError> {
    let tokens = provider_tokens(extra_patterns);
    let mut hazards = Vec::new();
    for config in client.list_webhooks().await? {
        if let Some(reason) = classify(client, &config).await {
            hazards.push(WebhookHazard {
                provider: provider_token(&config.name, &tokens),
                kind: config.kind,
                name: config.name,
                reason,
            });
        }
    }
    Ok(hazards)
}

/// Find hazardous webhook configurations and remove them according to `policy`
pub async fn detect(
    client: &dyn ClusterClient,
    policy: RemovalPolicy,
    extra_patterns: &[String],
) -> Result<WebhookSummary, ClientError> {
    println!("🔍 Checking for problematic webhook configurations...");
    let hazards = find_hazards(client, extra_patterns).await?;
    let mut summary = WebhookSummary {
        found: hazards.len(),
        ..Default::default()
    };

    for hazard in &hazards {
        let owner = match &hazard.provider {
            Some(token) => format!("{} ", token),
            None => String::new(),
        };
        println!(
            "{} Found potentially problematic {}{} webhook: {} ({})",
            "⚠️ ".yellow(),
            owner,
            hazard.kind,
            hazard.name,
            hazard.reason
        );

        let remove = match policy {
            RemovalPolicy::Auto => true,
            RemovalPolicy::Never => false,
            RemovalPolicy::Prompt => crate::utils::confirm(&format!(
                "Temporarily remove {} webhook configuration {}?",
                hazard.kind, hazard.name
            ))
            .unwrap_or(false),
        };
        if !remove {
            continue;
        }

        println!(
            "🔧 Temporarily removing {} webhook configuration: {}",
            hazard.kind, hazard.name
        );
        let removed = match client.delete_webhook(hazard.kind, &hazard.name).await {
            Ok(()) => {
                println!("{} Removed webhook configuration: {}", "✓".green(), hazard.name);
                true
            }
            Err(e) if e.is_not_found() => true,
            Err(e) => {
                crate::log_warn!("Failed to remove webhook configuration {}: {}", hazard.name, e);
                false
            }
        };
        if removed {
            summary.removed += 1;
            if hazard.provider.is_some() {
                summary.providers_removed += 1;
            }
        }
    }

    if summary.found > 0 {
        println!(
            "📊 Webhook summary: {} problematic found, {} disabled",
            summary.found, summary.removed
        );
        if summary.providers_removed > 0 {
            println!(
                "📊 Disabled {} storage provider webhooks",
                summary.providers_removed
            );
        }
    } else {
        println!("{} No problematic webhooks detected", "✓".green());
    }
    summary.hazards = hazards;
    Ok(summary)
}
