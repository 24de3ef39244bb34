//! Tipos de Erro do Alocador
//!
//! Erros esperados (OOM, ponteiro inválido, argumento ruim) voltam como
//! `MmError`. Violações de invariantes internas não passam por aqui: são
//! fatais.

/// Erros do subsistema de memória
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    /// Page Source esgotado, ou NO_SLEEP num cache vazio
    OutOfMemory,
    /// Parâmetro inválido
    InvalidParameter,
    /// Falha na inicialização
    InitFailed,
    /// Double free detectado
    DoubleFree,
    /// Ponteiro não pertence a nenhum slab em uso (ou cabeçalho inválido)
    InvalidAddress,
    /// Endereço não alinhado a página
    NotAligned,
    /// Tamanho inválido (zero ou muito grande)
    InvalidSize,
    /// Região já pertence a um slab
    AlreadyMapped,
    /// Região desconhecida pelo Page Source
    NotMapped,
    /// Metadados inconsistentes encontrados na verificação
    CorruptedMetadata,
}

impl MmError {
    /// Retorna descrição legível do erro
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfMemory => "OOM: sem páginas disponíveis",
            Self::InvalidParameter => "Parâmetro inválido",
            Self::InitFailed => "Falha na inicialização",
            Self::DoubleFree => "Double free detectado",
            Self::InvalidAddress => "Endereço inválido",
            Self::NotAligned => "Endereço não alinhado a página",
            Self::InvalidSize => "Tamanho inválido",
            Self::AlreadyMapped => "Região já pertence a um slab",
            Self::NotMapped => "Região não mapeada",
            Self::CorruptedMetadata => "Metadados do slab corrompidos",
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
