//! 数据库密码加密工具，输出可直接写入配置文件的密文

use std::io::{self, BufRead};

use anyhow::{anyhow, Context, Result};
use clap::{Arg, Command};
use hawthorn_core::{AppConfig, PasswordCipher};

const DEFAULT_CONFIG: &str = "config/hawthorn.toml";

fn main() -> Result<()> {
    let matches = Command::new("encrypt-tool")
        .version(env!("CARGO_PKG_VERSION"))
        .about("使用配置中的密钥加密数据库密码")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value(DEFAULT_CONFIG),
        )
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_name("NAME")
                .help("数据源名称，缺省使用 databases.default 的密钥"),
        )
        .arg(
            Arg::new("password")
                .short('p')
                .long("password")
                .value_name("PASSWORD")
                .help("明文密码，缺省从标准输入读取一行"),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("加载配置文件失败: {config_path}"))?;

    let key = secret_key(&config, matches.get_one::<String>("target").map(String::as_str))?;
    let password = match matches.get_one::<String>("password") {
        Some(password) => password.clone(),
        None => read_password()?,
    };

    let cipher = PasswordCipher::new(key.as_bytes())?;
    println!("{}", cipher.encrypt(&password)?);
    Ok(())
}

fn secret_key(config: &AppConfig, target: Option<&str>) -> Result<String> {
    let key = match target {
        Some(name) => {
            let database = config
                .databases
                .lists
                .get(name)
                .ok_or_else(|| anyhow!("数据源 {name} 不存在"))?;
            database
                .primary
                .secret_key
                .clone()
                .or_else(|| database.default.secret_key.clone())
        }
        None => config.databases.default.secret_key.clone(),
    };

    key.filter(|key| !key.is_empty())
        .ok_or_else(|| anyhow!("未配置密码密钥 secret_key"))
}

fn read_password() -> Result<String> {
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("读取标准输入失败")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
