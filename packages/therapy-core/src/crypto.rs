//! Módulo de criptografia para dados clínicos sensíveis
//!
//! Histórico médico e diagnóstico dos pacientes são gravados com AES-256-GCM.
//! A chave é derivada da frase-senha configurada usando Argon2id e um salt
//! aleatório persistido no próprio banco.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use anyhow::Result;
use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng as RandOsRng, RngCore};
use thiserror::Error;
use zeroize::Zeroize;

/// Erros específicos para operações de criptografia
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Falha na criptografia: {0}")]
    EncryptionFailed(String),

    #[error("Falha na descriptografia: {0}")]
    DecryptionFailed(String),

    #[error("Dados inválidos: {0}")]
    InvalidData(String),

    #[error("Configuração de criptografia inválida: {0}")]
    InvalidConfiguration(String),
}

/// Tamanho do nonce em bytes para AES-GCM
const AES_GCM_NONCE_SIZE: usize = 12;

/// Tamanho do salt usado na derivação da chave
pub const KEY_SALT_SIZE: usize = 16;

/// Chave AES-256 para criptografia (com zeroização automática)
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct EncryptionKey(pub [u8; 32]);

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(**)")
    }
}

impl EncryptionKey {
    /// Deriva a chave da frase-senha com Argon2id
    pub fn derive(key_phrase: &str, salt: &[u8]) -> Result<Self, CryptoError> {
        if key_phrase.is_empty() {
            return Err(CryptoError::InvalidConfiguration(
                "A frase-senha do banco não pode ser vazia".to_string(),
            ));
        }

        let params = Params::new(19 * 1024, 2, 1, Some(32))
            .map_err(|e| CryptoError::InvalidConfiguration(e.to_string()))?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; 32];
        argon
            .hash_password_into(key_phrase.as_bytes(), salt, &mut key)
            .map_err(|e| CryptoError::InvalidConfiguration(e.to_string()))?;
        Ok(Self(key))
    }

    /// Converte para bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Gera um salt aleatório para [`EncryptionKey::derive`]
pub fn generate_salt() -> [u8; KEY_SALT_SIZE] {
    let mut salt = [0u8; KEY_SALT_SIZE];
    RandOsRng.fill_bytes(&mut salt);
    salt
}

/// Estrutura que armazena dados criptografados e seu nonce
#[derive(Debug, Clone)]
pub struct EncryptedData {
    /// Dados criptografados
    pub ciphertext: Vec<u8>,
    /// Nonce usado na criptografia
    pub nonce: Vec<u8>,
}

/// Criptografa dados usando AES-256-GCM
pub fn encrypt(data: &[u8], key: &EncryptionKey) -> Result<EncryptedData, CryptoError> {
    let aes_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(aes_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, data)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(EncryptedData {
        ciphertext,
        nonce: nonce.to_vec(),
    })
}

/// Descriptografa dados usando AES-256-GCM
pub fn decrypt(encrypted: &EncryptedData, key: &EncryptionKey) -> Result<Vec<u8>, CryptoError> {
    let aes_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(aes_key);

    if encrypted.nonce.len() != AES_GCM_NONCE_SIZE {
        return Err(CryptoError::InvalidData(format!(
            "Nonce inválido: esperado {} bytes, recebido {}",
            AES_GCM_NONCE_SIZE,
            encrypted.nonce.len()
        )));
    }

    let nonce = Nonce::from_slice(&encrypted.nonce);

    cipher
        .decrypt(nonce, encrypted.ciphertext.as_ref())
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Criptografa um texto UTF-8
pub fn encrypt_text(text: &str, key: &EncryptionKey) -> Result<EncryptedData, CryptoError> {
    encrypt(text.as_bytes(), key)
}

/// Descriptografa um texto UTF-8
pub fn decrypt_text(encrypted: &EncryptedData, key: &EncryptionKey) -> Result<String, CryptoError> {
    let plaintext = decrypt(encrypted, key)?;
    String::from_utf8(plaintext).map_err(|e| CryptoError::InvalidData(e.to_string()))
}
