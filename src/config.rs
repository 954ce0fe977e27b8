//! Configuration management for the bridge service

use std::env;

use anyhow::bail;
use chrono::NaiveTime;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub amo: AmoConfig,
    pub checkbox: CheckboxConfig,
    pub nova_poshta: NovaPoshtaConfig,
    pub telegram: TelegramConfig,
    pub receipt_window: ReceiptWindowConfig,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct AmoConfig {
    pub base_url: String,
    pub access_token: String,
    pub purchases_catalog_id: i64,
    pub field_status: i64,
    pub field_discount: i64,
    /// Processing-flag field. 0 disables both the idempotence check and write-back.
    pub field_checkbox_status: i64,
    /// Waybill-number field. 0 means the deal carries no TTN.
    pub field_ttn: i64,
    /// Repeating "items" block on a purchase catalog element. 0 disables it.
    pub purchase_items_field_id: i64,
    /// Fallback price field on a purchase catalog element. 0 falls back to the `PRICE` code.
    pub purchase_price_field_id: i64,
    pub status_target: String,
}

/// One set of cashier credentials plus a terminal license key.
#[derive(Debug, Clone)]
pub struct FiscalProfile {
    pub id: String,
    pub login: String,
    pub password: String,
    pub license_key: String,
}

#[derive(Debug, Clone)]
pub struct CheckboxConfig {
    pub api_base: String,
    /// Configured cashier profiles, in routing priority order.
    pub profiles: Vec<FiscalProfile>,
    pub send_email: bool,
    pub payment_type: String,
    pub client_name: String,
    pub client_version: String,
}

impl CheckboxConfig {
    pub fn profile(&self, profile_id: &str) -> Option<&FiscalProfile> {
        self.profiles.iter().find(|p| p.id == profile_id)
    }
}

/// One Nova Poshta API key plus the sender name its waybills are expected to carry.
#[derive(Debug, Clone)]
pub struct CourierAccount {
    pub id: String,
    pub api_key: String,
    pub sender_name: String,
}

#[derive(Debug, Clone)]
pub struct NovaPoshtaConfig {
    pub api_url: String,
    /// Accounts in fixed priority order ("1" first, then "2").
    pub accounts: Vec<CourierAccount>,
}

impl NovaPoshtaConfig {
    pub fn sender_label(&self, profile_id: &str) -> String {
        self.accounts
            .iter()
            .find(|a| a.id == profile_id && !a.sender_name.is_empty())
            .map(|a| a.sender_name.clone())
            .unwrap_or_else(|| profile_id.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    pub fn is_enabled(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

/// Kyiv-local window during which receipts must not be issued: [close_at, open_at).
#[derive(Debug, Clone)]
pub struct ReceiptWindowConfig {
    pub close_at: NaiveTime,
    pub open_at: NaiveTime,
}

#[cfg(test)]
impl AppConfig {
    /// Baseline config for tests; point the base URLs at mock servers.
    pub fn for_tests() -> Self {
        AppConfig {
            amo: AmoConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                access_token: "test-token".to_string(),
                purchases_catalog_id: 77,
                field_status: 100,
                field_discount: 200,
                field_checkbox_status: 300,
                field_ttn: 400,
                purchase_items_field_id: 500,
                purchase_price_field_id: 0,
                status_target: "Контроль оплаты".to_string(),
            },
            checkbox: CheckboxConfig {
                api_base: "http://127.0.0.1:1".to_string(),
                profiles: vec![
                    FiscalProfile {
                        id: "1".to_string(),
                        login: "cashier-1".to_string(),
                        password: "secret-1".to_string(),
                        license_key: "license-1".to_string(),
                    },
                    FiscalProfile {
                        id: "2".to_string(),
                        login: "cashier-2".to_string(),
                        password: "secret-2".to_string(),
                        license_key: "license-2".to_string(),
                    },
                ],
                send_email: true,
                payment_type: "CASHLESS".to_string(),
                client_name: "amo-checkbox-bridge".to_string(),
                client_version: "1.0.0".to_string(),
            },
            nova_poshta: NovaPoshtaConfig {
                api_url: "http://127.0.0.1:1/".to_string(),
                accounts: vec![
                    CourierAccount {
                        id: "1".to_string(),
                        api_key: "np-key-1".to_string(),
                        sender_name: "ФОП Перша".to_string(),
                    },
                    CourierAccount {
                        id: "2".to_string(),
                        api_key: "np-key-2".to_string(),
                        sender_name: "ФОП Друга".to_string(),
                    },
                ],
            },
            telegram: TelegramConfig {
                bot_token: String::new(),
                chat_id: String::new(),
            },
            receipt_window: ReceiptWindowConfig {
                close_at: NaiveTime::from_hms_opt(23, 45, 0).unwrap(),
                open_at: NaiveTime::from_hms_opt(0, 1, 0).unwrap(),
            },
            port: 0,
        }
    }
}

fn env_required(name: &str) -> anyhow::Result<String> {
    env::var(name).map_err(|e| anyhow::anyhow!("{} must be set: {}", name, e))
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_field_id(name: &str, default: &str) -> anyhow::Result<i64> {
    env_or(name, default)
        .parse()
        .map_err(|e| anyhow::anyhow!("{} is not a numeric field id: {}", name, e))
}

fn fiscal_profile(n: u8) -> Option<FiscalProfile> {
    let login = env_or(&format!("CHECKBOX_CASHIER_LOGIN_{}", n), "");
    let password = env_or(&format!("CHECKBOX_CASHIER_PASSWORD_{}", n), "");
    let license_key = env_or(&format!("CHECKBOX_LICENSE_KEY_{}", n), "");
    // A profile is usable only with all three credential fields present.
    if login.is_empty() || password.is_empty() || license_key.is_empty() {
        return None;
    }
    Some(FiscalProfile {
        id: n.to_string(),
        login,
        password,
        license_key,
    })
}

fn courier_account(n: u8) -> Option<CourierAccount> {
    let api_key = env_or(&format!("NP_API_KEY_{}", n), "");
    if api_key.is_empty() {
        return None;
    }
    Some(CourierAccount {
        id: n.to_string(),
        api_key,
        sender_name: env_or(&format!("NP_SENDER_NAME_{}", n), "")
            .trim()
            .to_string(),
    })
}

fn parse_window_time(name: &str, default: &str) -> anyhow::Result<NaiveTime> {
    let raw = env_or(name, default);
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .map_err(|e| anyhow::anyhow!("{} must be HH:MM, got {:?}: {}", name, raw, e))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let amo = AmoConfig {
            base_url: env_required("AMO_BASE_URL")?.trim_end_matches('/').to_string(),
            access_token: env_required("AMO_ACCESS_TOKEN")?,
            purchases_catalog_id: env_required("AMO_PURCHASES_CATALOG_ID")?.parse()?,
            field_status: env_field_id("AMO_FIELD_STATUS", "459279")?,
            field_discount: env_field_id("AMO_FIELD_DISCOUNT", "825281")?,
            field_checkbox_status: env_field_id("AMO_FIELD_CHECKBOX_STATUS", "0")?,
            field_ttn: env_field_id("AMO_FIELD_TTN", "0")?,
            purchase_items_field_id: env_field_id("AMO_PURCHASE_ITEMS_FIELD_ID", "0")?,
            purchase_price_field_id: env_field_id("AMO_PURCHASE_PRICE_FIELD_ID", "0")?,
            status_target: env_or("AMO_STATUS_TARGET", "Контроль оплаты"),
        };

        let profiles: Vec<FiscalProfile> = (1..=2).filter_map(fiscal_profile).collect();
        if profiles.is_empty() {
            bail!("at least one Checkbox cashier profile must be configured (CHECKBOX_CASHIER_LOGIN_1 / CHECKBOX_CASHIER_PASSWORD_1 / CHECKBOX_LICENSE_KEY_1)");
        }

        let checkbox = CheckboxConfig {
            api_base: env_or("CHECKBOX_API_BASE", "https://api.checkbox.in.ua/api/v1")
                .trim_end_matches('/')
                .to_string(),
            profiles,
            send_email: env_or("CHECKBOX_SEND_EMAIL", "true").to_lowercase() == "true",
            payment_type: env_or("CHECKBOX_PAYMENT_TYPE", "CASHLESS"),
            client_name: env_or("CHECKBOX_CLIENT_NAME", "amo-checkbox-bridge"),
            client_version: env_or("CHECKBOX_CLIENT_VERSION", "1.0.0"),
        };

        let nova_poshta = NovaPoshtaConfig {
            api_url: env_or("NP_API_URL", "https://api.novaposhta.ua/v2.0/json/"),
            accounts: (1..=2).filter_map(courier_account).collect(),
        };

        let telegram = TelegramConfig {
            bot_token: env_or("TELEGRAM_BOT_TOKEN", ""),
            chat_id: env_or("TELEGRAM_CHAT_ID", ""),
        };

        let receipt_window = ReceiptWindowConfig {
            close_at: parse_window_time("RECEIPT_WINDOW_CLOSE", "23:45")?,
            open_at: parse_window_time("RECEIPT_WINDOW_OPEN", "00:01")?,
        };

        let port = env_or("PORT", "8080")
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("PORT must be a port number: {}", e))?;

        Ok(AppConfig {
            amo,
            checkbox,
            nova_poshta,
            telegram,
            receipt_window,
            port,
        })
    }
}
