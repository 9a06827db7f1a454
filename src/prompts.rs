//! Instruction prompts sent to the extractor.
//!
//! The prompts are in Portuguese, like the receipts. The JSON keys named
//! here are the ones [`crate::receipt::Receipt`] expects.
//!
//! Callers can override either prompt via
//! [`crate::config::ServiceConfig::image_prompt`] /
//! [`crate::config::ServiceConfig::text_prompt`].

/// Shared field list and category rules.
const RECEIPT_SCHEMA: &str = r#"Extraia e retorne SOMENTE um objeto JSON com os campos:
- categoria (ex: supermercado, farmácia, posto de combustível, restaurante; obrigatório)
- razao_social
- nome_fantasia (null se não houver)
- CNPJ
- endereco
- data_compra
- total_compra (número)
- chave_acesso (a chave de acesso completa com 44 dígitos, sem espaços; "" se ilegível)
- produtos: lista com os campos codigo (EAN/GTIN, se visível), produto, quantidade (número), preco_unitario (número), preco_total (número)

Para determinar a categoria:
- Priorize o nome do estabelecimento (ex: Assaí, Drogasil, Boticário).
- Use os tipos de produtos apenas como apoio secundário.
- Mesmo que o cupom contenha itens variados, se for de um supermercado, classifique como "supermercado".
- Nunca retorne múltiplas categorias: escolha uma única categoria principal com base no local da compra.

Valores numéricos devem usar ponto decimal (12.50), nunca vírgula.
Não adicione comentários nem texto fora do JSON."#;

/// Default prompt for a photographed or scanned receipt.
pub fn default_image_prompt() -> String {
    format!(
        "Você é um assistente especializado em interpretar cupons fiscais brasileiros (NFC-e / SAT). \
A imagem a seguir é a foto de um cupom fiscal.\n\n{RECEIPT_SCHEMA}"
    )
}

/// Default prompt for receipt text (e.g. copied from a NFC-e consultation page).
pub fn default_text_prompt() -> String {
    format!(
        "Você é um assistente especializado em interpretar cupons fiscais brasileiros (NFC-e / SAT). \
A mensagem a seguir contém o texto de um cupom fiscal.\n\n{RECEIPT_SCHEMA}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_name_every_canonical_field() {
        for prompt in [default_image_prompt(), default_text_prompt()] {
            for field in [
                "categoria",
                "razao_social",
                "nome_fantasia",
                "CNPJ",
                "endereco",
                "data_compra",
                "total_compra",
                "chave_acesso",
                "produtos",
                "preco_unitario",
            ] {
                assert!(prompt.contains(field), "prompt is missing '{field}'");
            }
        }
    }

    #[test]
    fn prompts_differ_by_modality() {
        assert!(default_image_prompt().contains("imagem"));
        assert!(default_text_prompt().contains("texto"));
    }
}
