//! Tipos de Erro do Reclaim de Memória
//!
//! Contenção de lock NÃO é erro: as passadas do shrinker sinalizam isso pelo
//! valor de retorno (0, `ScanResult::Stop` ou nenhum trabalho).

/// Erros do reclaim / objetos GEM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    /// Sem memória para alocar handle ou backing storage
    OutOfMemory,
    /// Shrinker já inicializado neste device
    AlreadyRegistered,
    /// Handle de shrinker/notifier desconhecido
    NotFound,
    /// Objeto em estado que não permite a operação (ex.: madv != WillNeed)
    Busy,
    /// Backing storage já foi purgada
    Purged,
    /// Tamanho inválido (zero)
    InvalidSize,
    /// Objeto não pertence a este device
    InvalidObject,
}

impl MmError {
    /// Retorna descrição legível do erro
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfMemory => "OOM: sem memória para a operação",
            Self::AlreadyRegistered => "Shrinker já registrado",
            Self::NotFound => "Handle não encontrado",
            Self::Busy => "Objeto ocupado",
            Self::Purged => "Backing storage purgada",
            Self::InvalidSize => "Tamanho inválido",
            Self::InvalidObject => "Objeto não pertence ao device",
        }
    }
}

impl core::fmt::Display for MmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tipo Result específico para operações de memória
pub type MmResult<T> = Result<T, MmError>;
