use anyhow::Result;
use config::{Config, ConfigBuilder, Environment, File};
use config::builder::DefaultState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "Eres un asistente experto en traducción de idiomas, especialmente en el idioma maya. \
Tu tarea es ayudar a los usuarios a traducir frases o palabras de cualquier idioma al maya de manera precisa y culturalmente adecuada. \
Proporciona explicaciones breves sobre las traducciones cuando sea relevante, incluyendo contexto cultural si es necesario. \
Mantén un tono amigable y accesible, adecuado para todos los niveles de conocimiento del idioma maya. \
Utiliza la información de TODOS los documentos de referencia adjuntos para mejorar la precisión de las traducciones. \
Importante: para la comprensión, contexto y sutilezas culturales del idioma maya, utiliza el documento 'cordemex_diccionario_maya.pdf'. \
No solo traduzcas literalmente, sino que también considera el contexto y las sutilezas culturales del idioma maya. \
Si no estás seguro de una traducción, indícalo claramente en tu respuesta.";

pub const DEFAULT_PRIMING_INSTRUCTION: &str = "Por favor, utiliza TODOS los diccionarios adjuntos como principal fuente \
de referencia para todas las peticiones de traducción que se te hagan a partir de ahora.";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub documents: DocumentsConfig,
    pub prompts: PromptsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DocumentsConfig {
    pub directory: String,
    pub files: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    pub system_instruction: String,
    pub priming_instruction: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
    /// Daily rolling log files are written here when set.
    #[serde(default)]
    pub directory: Option<String>,
}

impl DocumentsConfig {
    /// Full paths of the reference documents, in upload order.
    pub fn paths(&self) -> Vec<PathBuf> {
        let root = PathBuf::from(&self.directory);
        self.files.iter().map(|f| root.join(f)).collect()
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::defaults(Config::builder())?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    fn defaults(builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>> {
        // GEMINI_API_KEY is what the hosted SDKs read, keep honouring it
        let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();

        let builder = builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("gemini.api_key", api_key)?
            .set_default("gemini.base_url", DEFAULT_BASE_URL)?
            .set_default("gemini.model", DEFAULT_MODEL)?
            .set_default("gemini.temperature", 0.2)?
            .set_default("gemini.connect_timeout_seconds", 10)?
            .set_default("documents.directory", "doc")?
            .set_default(
                "documents.files",
                vec![
                    "Diccionario_Maya_Espanol.pdf".to_string(),
                    "cordemex_diccionario_maya.pdf".to_string(),
                ],
            )?
            .set_default("prompts.system_instruction", DEFAULT_SYSTEM_INSTRUCTION)?
            .set_default("prompts.priming_instruction", DEFAULT_PRIMING_INSTRUCTION)?
            .set_default("logging.filter", "info,chat_relay_server=debug")?
            .set_default("logging.json", true)?;

        Ok(builder)
    }
}
