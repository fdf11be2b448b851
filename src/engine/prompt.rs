use crate::schema::SchemaDocument;

/// Prefix of the user message; the raw question follows it.
pub const USER_MESSAGE_PREFIX: &str = "Convert this question to a safe query: ";

const RULES: &str = r#"You MUST respond with a single valid JSON object and nothing else.

## Choosing a shape

Use the MULTI-MODEL shape when:
1. The question combines information from different entity types
2. The question asks for related data (for example "user details") next to other data
3. The question wants data shown together or linked
4. The question uses joining words such as "yhdistä" (combine) or "näytä" (show) with several kinds of data

Use the AGGREGATION shape when:
1. The question asks for counts, sums, averages, or other aggregates
2. The question asks to group data by a field or a time period
3. The question is analytical ("how many", "total amount", frequency, distribution, trends)
4. The question contains analytical words in any language, including Finnish
   "montako" / "kuinka monta" (how many) and "ryhmittele" (group by)
5. The natural meaning is a summary rather than a list of individual records

Every aggregation MUST have at least one entry in "group_by". Never leave it empty:
- for "how many X" use the most meaningful categorical field (state, type, category)
- for "total X" use a date field with month granularity if one exists
- if nothing else fits, group by "id"

Otherwise use the SINGLE-MODEL shape.

## Shapes

Single model:
{
  "model": "res.partner",
  "domain": [["is_company", "=", true], ["country_id", "!=", false]],
  "fields": ["name", "email", "phone"],
  "limit": 10
}

Multiple models:
{
  "multi_model": true,
  "queries": [
    {"model": "res.users.log", "domain": [], "fields": ["create_date", "user_id"], "limit": 50},
    {"model": "res.users", "domain": [], "fields": ["name", "login", "company_id"], "limit": 50}
  ]
}

Aggregation:
{
  "aggregation": true,
  "model": "account.move",
  "domain": [],
  "group_by": ["invoice_date:day"],
  "measures": ["__count"],
  "limit": 100
}

## Rules

- Domains are lists of [field, operator, value] terms, optionally prefixed with "&", "|" or "!".
- NEVER use dotted relation paths such as "create_uid.name" in fields. Use the multi-model shape to fetch related data.
- Group dates with the field:granularity syntax: field:day, field:week, field:month or field:year.
- "__count" as a measure means the number of records.
- Only use entity types and fields listed in the schema.
"#;

/// Build the system instruction: role, serialized schema, and the fixed rule set.
pub fn build_system_prompt(schema: &SchemaDocument) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a query expert. You translate natural-language questions into read-only structured queries.\n",
    );
    prompt.push_str("Here is the schema of the available entity types: ");
    prompt.push_str(&schema.to_prompt_value().to_string());
    prompt.push_str("\n\n");
    prompt.push_str(RULES);
    prompt
}

pub fn build_user_message(query: &str) -> String {
    format!("{USER_MESSAGE_PREFIX}{query}")
}
