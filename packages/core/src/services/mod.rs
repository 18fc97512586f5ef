pub mod email_delivery;
pub mod instance_principal;
pub mod signer;
