//! Prompt template registry.
//!
//! Holds the instructions, prompt text and output schema for each stage that
//! consults the reasoning collaborator. Templates use `{{variable}}`
//! placeholders and turn into an [`LlmCall`] once rendered.

use crate::error::PromptError;
use crate::llm_call::LlmCall;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;

/// Template name for problem triage.
pub const TRIAGE: &str = "triage";
/// Template name for known-issue matching.
pub const KNOWLEDGE_MATCH: &str = "knowledge_match";
/// Template name for automated resolution.
pub const RESOLUTION: &str = "resolution";

const TRIAGE_INSTRUCTIONS: &str = "És um agente de triagem de suporte.
A tua tarefa é analisar a mensagem inicial do cliente e extrair informações essenciais.

O teu objetivo é entender e classificar o problema:
- Identifica o tipo de problema (login, pagamento, funcionalidade, bug, dúvida)
- Extrai informações-chave (email, ID do pedido, descrição do erro, etc.)
- Classifica a urgência (crítica, alta, média, baixa):
  * Crítica: sistema fora, perda financeira, múltiplos usuários afetados
  * Alta: funcionalidade importante quebrada, cliente bloqueado, prazo urgente
  * Média: inconveniência, mas há workaround
  * Baixa: dúvida, sugestão, problema cosmético

Se julgar importante questione o que o utilizador estava a tentar fazer, e qualquer outra informação relevante.

- Se entenderes o problema com base em todo o contexto, resume-o de forma clara e objetiva.
- Se precisares de mais informações para entender, escreve UMA pergunta para clarificar o problema e diga que não entendeu.
- Não tentes resolvê-lo, apenas resume o problema ou peça mais informações.";

const KNOWLEDGE_MATCH_INSTRUCTIONS: &str = "És um agente de suporte.
A tua tarefa é analisar o resumo do problema do cliente, e verificar se é um dos problemas conhecidos.
O teu objetivo é encontrar se o problema está listado nos problemas conhecidos através de palavras chaves.

- Se o problema é conhecido, informe o próximo agente as ações necessárias para resolve-lo.
- Se não tiver solução informe se possui um prazo de solução cadastrado.
- Se o problema é complexo, informe que será atendido por um humano.";

const RESOLUTION_INSTRUCTIONS: &str = "És um agente de resolução de suporte.
A tua tarefa é tentar resolver o problema do cliente automaticamente.

O teu objetivo é solucionar o problema usando as ferramentas disponíveis:
- Analisa a solução sugerida pelo agente de problemas frequentes
- Se tens acesso às ferramentas necessárias, executa as ações
- Explica ao cliente o que fizeste de forma clara e simples
- Confirma se o problema foi resolvido
- Se a ação falhar ou não tiveres a ferramenta necessária, informa que será escalado para humano

Problemas que PODES resolver sozinho:
- Reset de senha
- Desbloqueio de conta
- Consulta de status
- Reenvio de emails
- Verificações simples no sistema

Problemas que DEVEM ir para humano:
- Reembolsos acima de R$ 500
- Alterações de plano/contrato
- Bugs no sistema
- Solicitações de cancelamento
- Qualquer coisa que envolva decisão de negócio

Sempre pede confirmação ao cliente após resolver.";

const RESOLUTION_PROMPT: &str = "Resolva o seguinte problema:
Problema: {{problem}}
Solução: {{solution}}
Ferramentas disponíveis: {{tools}}
Detalhes do cliente: {{customer_detail}}

Use as ferramentas necessárias para resolver o problema:
- UnlockAccount: Desbloquear a conta do usuário
- SendEmail: Enviar email de reset de senha

Explique o que fez para resolver o problema.

Para executar uma ferramenta inclua-a em tool_calls com os argumentos do seu input_schema:
{{tool_catalog}}";

/// Definition of a template variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDefinition {
    /// Description of what this variable is for.
    pub description: String,
    /// Whether this variable is required.
    pub required: bool,
    /// Default value if not provided.
    pub default: Option<JsonValue>,
}

impl VariableDefinition {
    /// Creates a required variable definition.
    #[must_use]
    pub fn required(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Creates an optional variable definition.
    #[must_use]
    pub fn optional(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: false,
            default: None,
        }
    }

    /// Sets a default value.
    #[must_use]
    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// A prompt template for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name (used for lookup).
    pub name: String,
    /// Template content with placeholders.
    pub content: String,
    /// Optional system prompt.
    pub system_prompt: Option<String>,
    /// JSON schema the reply must follow, if any.
    pub output_schema: Option<JsonValue>,
    /// Variable definitions (name -> description).
    pub variables: HashMap<String, VariableDefinition>,
}

impl PromptTemplate {
    /// Creates a new prompt template.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            system_prompt: None,
            output_schema: None,
            variables: HashMap::new(),
        }
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    /// Sets the output schema.
    #[must_use]
    pub fn with_output_schema(mut self, schema: JsonValue) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Adds a variable definition.
    #[must_use]
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        definition: VariableDefinition,
    ) -> Self {
        self.variables.insert(name.into(), definition);
        self
    }

    /// Renders the template with the given variables.
    ///
    /// Variables are substituted using `{{variable_name}}` syntax; declared
    /// variables that were not supplied fall back to their default.
    ///
    /// # Errors
    ///
    /// Returns `MissingVariable` for a required variable with no value and
    /// no default.
    pub fn render(&self, variables: &HashMap<String, JsonValue>) -> Result<String, PromptError> {
        self.validate_variables(variables)?;

        let mut result = self.content.clone();
        for (name, value) in variables {
            result = result.replace(&placeholder(name), &as_text(value));
        }
        for (name, def) in &self.variables {
            if let Some(default) = &def.default {
                result = result.replace(&placeholder(name), &as_text(default));
            }
        }
        Ok(result)
    }

    /// Validates that all required variables are provided.
    ///
    /// # Errors
    ///
    /// Returns `MissingVariable` naming the first missing variable in
    /// alphabetical order.
    pub fn validate_variables(
        &self,
        variables: &HashMap<String, JsonValue>,
    ) -> Result<(), PromptError> {
        let mut missing: Vec<&String> = self
            .variables
            .iter()
            .filter(|(_, def)| def.required && def.default.is_none())
            .filter(|(name, _)| !variables.contains_key(*name))
            .map(|(name, _)| name)
            .collect();
        missing.sort();

        match missing.first() {
            None => Ok(()),
            Some(variable) => Err(PromptError::MissingVariable {
                template: self.name.clone(),
                variable: (*variable).clone(),
            }),
        }
    }

    /// Renders the template into a ready-to-send call.
    ///
    /// # Errors
    ///
    /// Returns `MissingVariable` if a required variable is absent.
    pub fn to_call(&self, variables: &HashMap<String, JsonValue>) -> Result<LlmCall, PromptError> {
        let mut call = LlmCall::new(self.render(variables)?);
        if let Some(system) = &self.system_prompt {
            call = call.with_system_prompt(system.clone());
        }
        if let Some(schema) = &self.output_schema {
            call = call.with_output_schema(schema.clone());
        }
        Ok(call)
    }
}

fn placeholder(name: &str) -> String {
    format!("{{{{{name}}}}}")
}

fn as_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Registry of prompt templates.
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Creates a registry with the triage, knowledge-match and resolution
    /// templates.
    #[must_use]
    pub fn support_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(triage_template());
        registry.register(knowledge_match_template());
        registry.register(resolution_template());
        registry
    }

    /// Registers a template, replacing any template with the same name.
    pub fn register(&mut self, template: PromptTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Gets a template by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.get(name)
    }

    /// Gets a template by name or reports it missing.
    ///
    /// # Errors
    ///
    /// Returns `TemplateNotFound` if no template has that name.
    pub fn require(&self, name: &str) -> Result<&PromptTemplate, PromptError> {
        self.get(name).ok_or_else(|| PromptError::TemplateNotFound {
            name: name.to_string(),
        })
    }

    /// Returns the number of registered templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn triage_template() -> PromptTemplate {
    PromptTemplate::new(TRIAGE, "{{message}}")
        .with_system_prompt(TRIAGE_INSTRUCTIONS)
        .with_variable(
            "message",
            VariableDefinition::required("Latest customer message"),
        )
        .with_output_schema(json!({
            "type": "object",
            "properties": {
                "is_understood": { "type": "boolean" },
                "question_for_user": { "type": "string" },
                "summary": { "type": "string" },
                "urgency": {
                    "type": "string",
                    "enum": ["critical", "high", "medium", "low"]
                }
            },
            "required": ["is_understood", "question_for_user", "summary", "urgency"],
            "additionalProperties": false
        }))
}

fn knowledge_match_template() -> PromptTemplate {
    PromptTemplate::new(KNOWLEDGE_MATCH, "Problema do Usuário: {{problem}}")
        .with_system_prompt(KNOWLEDGE_MATCH_INSTRUCTIONS)
        .with_variable(
            "problem",
            VariableDefinition::required("Problem summary and clarifications"),
        )
        .with_output_schema(json!({
            "type": "object",
            "properties": {
                "is_known": { "type": "boolean" },
                "message_for_user": { "type": "string" },
                "is_complex": { "type": "boolean" },
                "matched_issue": { "type": ["object", "null"] },
                "required_tools": { "type": "array", "items": { "type": "string" } },
                "success_rate": { "type": "number" }
            },
            "required": ["is_known", "message_for_user", "is_complex"],
            "additionalProperties": false
        }))
}

fn resolution_template() -> PromptTemplate {
    PromptTemplate::new(RESOLUTION, RESOLUTION_PROMPT)
        .with_system_prompt(RESOLUTION_INSTRUCTIONS)
        .with_variable("problem", VariableDefinition::required("Matched issue title"))
        .with_variable(
            "solution",
            VariableDefinition::optional("Known solution").with_default(json!("")),
        )
        .with_variable("tools", VariableDefinition::required("Required tool names"))
        .with_variable(
            "customer_detail",
            VariableDefinition::required("Customer-facing match message"),
        )
        .with_variable(
            "tool_catalog",
            VariableDefinition::optional("Tool definitions").with_default(json!("[]")),
        )
        .with_output_schema(json!({
            "type": "object",
            "properties": {
                "message_for_user": { "type": "string" },
                "tool_calls": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "arguments": { "type": "object" }
                        },
                        "required": ["name", "arguments"]
                    }
                }
            },
            "required": ["message_for_user", "tool_calls"]
        }))
}
