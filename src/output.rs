//! JSON rendering of repository values.

use quire_content::models::{ContentView, IdSet};
use quire_content::registry::{ContentType, CustomField};
use serde_json::{Value, json};
use time::UtcDateTime;
use time::format_description::well_known::Rfc3339;

fn timestamp(at: UtcDateTime) -> Value {
    at.format(&Rfc3339).map(Value::from).unwrap_or_else(|_| Value::from(at.unix_timestamp()))
}

fn set(ids: Option<&IdSet>) -> Value {
    ids.map(|ids| ids.iter().copied().collect()).unwrap_or_default()
}

pub fn content(view: &ContentView) -> Value {
    json!({
        "id": view.id,
        "link_id": view.link_id,
        "type_id": view.type_id,
        "type_name": view.type_name,
        "is_standard": view.is_standard,
        "title": view.title,
        "url_path": view.url_path,
        "url": view.url,
        "created_at": timestamp(view.created_at),
        "modified_at": timestamp(view.modified_at),
        "author": {
            "id": view.author.id,
            "username": view.author.username,
            "first_name": view.author.first_name,
            "last_name": view.author.last_name,
            "email": view.author.email,
        },
        "privileges": set(view.privileges.as_ref()),
        "topics": set(view.topics.as_ref()),
        "custom_fields": view.custom_fields,
    })
}

pub fn content_type(content_type: &ContentType) -> Value {
    json!({
        "id": content_type.id,
        "name": content_type.name,
        "singular_name": content_type.singular_name,
        "system_name": content_type.system_name,
        "custom_field_group": content_type.custom_field_group,
    })
}

pub fn custom_field(field: &CustomField) -> Value {
    json!({
        "id": field.id,
        "group": field.group,
        "name": field.name,
        "friendly_name": field.friendly_name,
        "order": field.order,
    })
}
