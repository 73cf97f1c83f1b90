use serde::Deserialize;
use uuid::Uuid;

/// SPPG fields as submitted from the profile form. Without `id` a new SPPG is
/// created and linked.
#[derive(Debug, Clone, Deserialize)]
pub struct SppgInput {
    pub id: Option<Uuid>,
    #[serde(alias = "nama")]
    pub name: Option<String>,
    #[serde(alias = "alamat")]
    pub address: Option<String>,
    #[serde(alias = "wilayah")]
    pub region: Option<String>,
    #[serde(alias = "kecamatan")]
    pub district: Option<String>,
}

/// Request body for `PUT /profile`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub position: Option<String>,
    pub avatar_url: Option<String>,
    /// `data:image/...;base64,...`
    #[serde(alias = "avatarFileBase64")]
    pub avatar_file_base64: Option<String>,
    pub sppg: Option<SppgInput>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_form_field_names() {
        let req: UpdateProfileRequest = serde_json::from_value(json!({
            "full_name": "Siti",
            "avatarFileBase64": "data:image/png;base64,AAAA",
            "sppg": { "nama": "Dapur Sehat", "kecamatan": "Cibeunying" }
        }))
        .unwrap();
        assert_eq!(req.avatar_file_base64.as_deref(), Some("data:image/png;base64,AAAA"));
        let sppg = req.sppg.unwrap();
        assert!(sppg.id.is_none());
        assert_eq!(sppg.name.as_deref(), Some("Dapur Sehat"));
        assert_eq!(sppg.district.as_deref(), Some("Cibeunying"));
    }
}
