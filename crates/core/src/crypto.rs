//! 数据库密码加解密
//!
//! 配置文件中只保存密文：`base64(nonce || ciphertext || tag)`，算法为 AES-128-GCM，
//! 每个数据库实例使用各自的16字节密钥。

use base64::{engine::general_purpose, Engine as _};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

use crate::{SchedulerError, SchedulerResult};

pub struct PasswordCipher {
    key: LessSafeKey,
}

impl PasswordCipher {
    pub const KEY_LEN: usize = 16;

    pub fn new(key: &[u8]) -> SchedulerResult<Self> {
        if key.len() != Self::KEY_LEN {
            return Err(SchedulerError::Crypto(format!(
                "密钥必须是{}字节，实际为{}字节",
                Self::KEY_LEN,
                key.len()
            )));
        }

        let unbound_key = UnboundKey::new(&aead::AES_128_GCM, key)
            .map_err(|e| SchedulerError::Crypto(format!("创建密钥失败: {e}")))?;

        Ok(Self {
            key: LessSafeKey::new(unbound_key),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> SchedulerResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|e| SchedulerError::Crypto(format!("生成随机数失败: {e}")))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|e| SchedulerError::Crypto(format!("加密失败: {e}")))?;

        let mut result = nonce_bytes.to_vec();
        result.extend_from_slice(&in_out);
        Ok(general_purpose::STANDARD.encode(result))
    }

    pub fn decrypt(&self, encrypted: &str) -> SchedulerResult<String> {
        if encrypted.is_empty() {
            return Ok(String::new());
        }

        let data = general_purpose::STANDARD
            .decode(encrypted)
            .map_err(|e| SchedulerError::Crypto(format!("Base64解码失败: {e}")))?;

        if data.len() < NONCE_LEN + self.key.algorithm().tag_len() {
            return Err(SchedulerError::Crypto("密文长度非法".to_string()));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|e| SchedulerError::Crypto(format!("随机数非法: {e}")))?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| SchedulerError::Crypto("解密失败，密钥或密文错误".to_string()))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|e| SchedulerError::Crypto(format!("明文不是UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef";

    #[test]
    fn test_encrypt_then_decrypt() {
        let cipher = PasswordCipher::new(KEY).unwrap();
        let encrypted = cipher.encrypt("p@ss:word/1").unwrap();

        assert_ne!(encrypted, "p@ss:word/1");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "p@ss:word/1");
    }

    #[test]
    fn test_nonce_is_random() {
        let cipher = PasswordCipher::new(KEY).unwrap();
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = PasswordCipher::new(KEY).unwrap().encrypt("secret").unwrap();
        let other = PasswordCipher::new(b"fedcba9876543210").unwrap();

        assert!(matches!(
            other.decrypt(&encrypted),
            Err(SchedulerError::Crypto(_))
        ));
    }

    #[test]
    fn test_key_length_enforced() {
        assert!(PasswordCipher::new(b"short").is_err());
        assert!(PasswordCipher::new(b"0123456789abcdef0").is_err());
    }

    #[test]
    fn test_malformed_ciphertext() {
        let cipher = PasswordCipher::new(KEY).unwrap();
        assert!(cipher.decrypt("not base64!").is_err());
        assert!(cipher.decrypt("AAAA").is_err());
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }
}
