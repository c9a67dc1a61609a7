// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported proof-of-work algorithms
///
/// Only RandomX derives its dataset from the job's seed; the CryptoNight
/// variants ignore it, so their contexts are trivial to rebuild.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum AlgorithmType {
    /// RandomX algorithm (CPU-optimized, ASIC-resistant)
    ///
    /// Needs a seed-keyed dataset: about 2 GiB in fast mode, 256 MiB light.
    #[clap(name = "randomx")]
    RandomX,

    /// CryptoNight variant 7 algorithm (legacy)
    ///
    /// Earlier version of Monero's PoW algorithm.
    /// Less memory intensive than RandomX but also less secure.
    #[clap(name = "cryptonight-v7")]
    CryptoNightV7,

    /// CryptoNight-R algorithm (legacy)
    ///
    /// Modified version of CryptoNight with small tweaks.
    /// Used during Monero's algorithm transition period.
    #[clap(name = "cryptonight-r")]
    CryptoNightR,
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmType::RandomX => write!(f, "randomx"),
            AlgorithmType::CryptoNightV7 => write!(f, "cryptonight-v7"),
            AlgorithmType::CryptoNightR => write!(f, "cryptonight-r"),
        }
    }
}

impl FromStr for AlgorithmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "randomx" => Ok(AlgorithmType::RandomX),
            "cnv7" | "cryptonight-v7" => Ok(AlgorithmType::CryptoNightV7),
            "cnr" | "cryptonight-r" => Ok(AlgorithmType::CryptoNightR),
            _ => Err(format!("Unknown algorithm: {}", s)),
        }
    }
}
