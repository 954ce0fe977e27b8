pub mod amocrm_service;
pub mod checkbox_service;
pub mod nova_poshta_service;
pub mod shift_maintenance_service;
pub mod telegram_service;
