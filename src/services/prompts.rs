//! Prompt construction for the domain endpoints.
//!
//! Pure string templating: no I/O, no upstream knowledge. The chat prompt may be
//! specialized by a topic block picked from keywords in the patient's question.

use crate::api::models::{
    DomainChatRequest, MedicationInput, Message, RecommendationRequest,
};

/// Persona and behavioural constraints of the ophthalmology consultant.
pub const SYSTEM_PROMPT: &str = "
你是一位专业的眼科医学顾问，基于患者的眼底检查结果和相关问题提供专业咨询。
你的职责是：
1. 解释眼科检查结果和诊断的含义
2. 回答患者关于眼部疾病、治疗方案和用药的问题
3. 提供基于循证医学的专业建议
4. 使用通俗易懂的语言解释专业概念
5. 在必要时强调寻求正规医疗机构和医生进一步诊疗的重要性

注意事项：
- 保持友善、耐心和专业的态度
- 避免做出确定性的诊断，应强调这只是辅助分析
- 避免开具处方或替代医生的治疗决策
- 当无法确定答案时，坦诚承认并建议咨询专业医生
- 回答应基于提供的病历信息和眼科专业知识
- 提供信息时应尽量引用可靠的医学资源
";

/// Expected answer layout, ending with the references section the extractor scrapes.
pub const ANSWER_FORMAT: &str = "
<回答内容，包括：
- 对问题的直接回答
- 相关医学解释
- 实用建议
- 必要的警示或提醒>

<参考资料（如适用）：
- 参考文献或指南名称
- 发布机构
- 年份>
";

pub const KNOWLEDGE_DOMAIN_RESTRICTIONS: &str = "
模型应限制在以下眼科专业领域内提供答案：
1. 常见眼科疾病的基础知识
2. 眼底疾病的诊断和治疗常识
3. 眼科用药和治疗方案的一般性知识
4. 眼部保健和预防措施
5. 眼科检查和随访的一般性建议

对于超出上述范围的问题，模型应礼貌地表示无法提供专业答案，并建议咨询专业医生。
";

/// System prompt for treatment recommendations. The reply must be a bare JSON object.
pub const RECOMMENDATION_SYSTEM_PROMPT: &str = r#"
你是一位专业的眼科医学顾问，需要根据患者的诊断结果和基本信息给出用药和治疗建议。

输出要求：
1. 只输出一个 JSON 对象，不要输出任何其他文字、解释或 Markdown 代码块
2. JSON 对象必须严格符合以下结构：
{
  "medications": [
    {
      "medication_name": "药物名称",
      "dosage": "剂量",
      "frequency": "使用频率",
      "side_effects": "可能的副作用"
    }
  ],
  "treatment_plan": {
    "treatment_type": "治疗类型",
    "treatment_detail": "治疗详情"
  }
}
3. 每个药物都必须包含 medication_name、dosage、frequency、side_effects 四个字段
4. treatment_plan 必须包含 treatment_type 和 treatment_detail 两个字段
5. 建议仅作为辅助参考，应基于循证医学，避免替代医生的临床决策
"#;

pub const NO_REMARK: &str = "无备注";
pub const NO_TREATMENT_PLAN: &str = "无治疗计划";
pub const UNKNOWN_MEDICATION: &str = "未知药物";
pub const NO_MEDICATIONS: &str = "无";

/// Question topics, in matching priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTopic {
    DiseaseExplanation,
    TreatmentPlan,
    Medication,
    PreventionLifestyle,
    SeverityPrognosis,
}

impl PromptTopic {
    pub const ALL: [PromptTopic; 5] = [
        PromptTopic::DiseaseExplanation,
        PromptTopic::TreatmentPlan,
        PromptTopic::Medication,
        PromptTopic::PreventionLifestyle,
        PromptTopic::SeverityPrognosis,
    ];

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            PromptTopic::DiseaseExplanation => &["什么病", "这个病是什么", "为什么会得", "病因"],
            PromptTopic::TreatmentPlan => &["怎么治", "如何治疗", "治疗方法", "需要手术"],
            PromptTopic::Medication => &["药", "用药", "药物", "副作用"],
            PromptTopic::PreventionLifestyle => &["预防", "生活", "日常", "饮食", "护眼"],
            PromptTopic::SeverityPrognosis => &["严重吗", "会好吗", "预后", "影响视力"],
        }
    }
}

/// First topic, in priority order, with a keyword contained in the lowercased question.
pub fn select_topic(question: &str) -> Option<PromptTopic> {
    let question = question.to_lowercase();
    PromptTopic::ALL
        .into_iter()
        .find(|topic| topic.keywords().iter().any(|kw| question.contains(kw)))
}

/// Render the medication list on one line.
pub fn format_medications(medications: &[MedicationInput]) -> String {
    if medications.is_empty() {
        return NO_MEDICATIONS.to_string();
    }

    medications
        .iter()
        .map(|med| {
            let mut info = non_blank(med.medication_name.as_deref())
                .unwrap_or(UNKNOWN_MEDICATION)
                .to_string();
            if let Some(dosage) = non_blank(med.dosage.as_deref()) {
                info.push_str("，剂量：");
                info.push_str(dosage);
            }
            if let Some(frequency) = non_blank(med.frequency.as_deref()) {
                info.push_str("，频率：");
                info.push_str(frequency);
            }
            if let Some(side_effects) = non_blank(med.side_effects.as_deref()) {
                info.push_str("，可能的副作用：");
                info.push_str(side_effects);
            }
            info
        })
        .collect::<Vec<_>>()
        .join("；")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Record fields with placeholders applied.
struct RecordFields<'a> {
    disease_name: &'a str,
    disease_category: &'a str,
    result: &'a str,
    remark: &'a str,
    treatment_plan: &'a str,
    medications: String,
    question: &'a str,
}

impl<'a> RecordFields<'a> {
    fn from_request(request: &'a DomainChatRequest) -> Self {
        Self {
            disease_name: &request.disease_name,
            disease_category: &request.disease_category,
            result: &request.result,
            remark: non_blank(request.remark.as_deref()).unwrap_or(NO_REMARK),
            treatment_plan: request
                .treatment_plan
                .as_ref()
                .and_then(|plan| non_blank(plan.treatment_detail.as_deref()))
                .unwrap_or(NO_TREATMENT_PLAN),
            medications: format_medications(request.medications.as_deref().unwrap_or_default()),
            question: &request.question,
        }
    }

    fn user_input(&self) -> String {
        format!(
            "\n根据您的眼底检查结果：\n\
             - 诊断: {} ({})\n\
             - 检查结果: {}\n\
             - 备注: {}\n\
             - 治疗计划: {}\n\
             - 用药信息: {}\n\n\
             您的问题是: {}\n",
            self.disease_name,
            self.disease_category,
            self.result,
            self.remark,
            self.treatment_plan,
            self.medications,
            self.question,
        )
    }

    fn specialized(&self, topic: PromptTopic) -> String {
        match topic {
            PromptTopic::DiseaseExplanation => format!(
                "\n请针对{name}提供以下信息：\n\
                 1. 简明的疾病定义\n\
                 2. 常见病因和风险因素\n\
                 3. 该疾病的典型症状和体征\n\
                 4. 可能的发展过程和预后\n\
                 5. 该疾病与患者当前症状的关联\n\n\
                 回答应该通俗易懂，避免过多专业术语，必要时对专业概念进行解释。同时，基于患者的具体情况（{result}）给出针对性说明。\n",
                name = self.disease_name,
                result = self.result,
            ),
            PromptTopic::TreatmentPlan => format!(
                "\n请基于患者的{name}诊断结果（{result}）和当前建议的治疗方案（{plan}），提供：\n\
                 1. 该疾病常规治疗方法概述\n\
                 2. 当前推荐治疗方案的原理和目的\n\
                 3. 治疗的预期效果和时间周期\n\
                 4. 治疗过程中的注意事项\n\
                 5. 何时应该随访或复查\n\n\
                 强调治疗方案的重要性，但避免替代医生的临床决策，建议患者遵循专业医生的具体指导。\n",
                name = self.disease_name,
                result = self.result,
                plan = self.treatment_plan,
            ),
            PromptTopic::Medication => format!(
                "\n针对患者使用的药物（{meds}），请提供：\n\
                 1. 药物的主要作用机制\n\
                 2. 正确的使用方法和频率\n\
                 3. 常见副作用及其处理方法\n\
                 4. 特殊注意事项（如禁忌症、药物相互作用）\n\
                 5. 用药依从性的重要性\n\n\
                 同时，根据患者的具体情况（{name}和{result}），解释为何医生选择这种药物治疗。\n",
                meds = self.medications,
                name = self.disease_name,
                result = self.result,
            ),
            PromptTopic::PreventionLifestyle => format!(
                "\n针对{name}，请提供以下生活方式和预防建议：\n\
                 1. 日常护眼和自我监测方法\n\
                 2. 饮食建议和营养补充\n\
                 3. 适宜和不适宜的活动\n\
                 4. 环境因素控制（如光线、屏幕使用等）\n\
                 5. 定期随访和检查的时间表\n\n\
                 这些建议应结合患者的具体情况（{result}和{remark}），着重强调对疾病管理特别重要的生活方式调整。\n",
                name = self.disease_name,
                result = self.result,
                remark = self.remark,
            ),
            PromptTopic::SeverityPrognosis => format!(
                "\n关于{name}的严重性和预后，请基于患者的检查结果（{result}）提供：\n\
                 1. 当前病情严重程度的客观评估\n\
                 2. 该疾病的自然病程和可能的进展\n\
                 3. 及时治疗与否对预后的影响\n\
                 4. 可能出现的并发症及其预防\n\
                 5. 长期管理和监测的重要性\n\n\
                 保持平衡的态度，既不过度淡化病情，也不引起不必要的恐慌。强调个体差异和积极治疗的价值。\n",
                name = self.disease_name,
                result = self.result,
            ),
        }
    }
}

/// Full chat system prompt: persona, answer layout and domain restrictions.
pub fn chat_system_prompt() -> String {
    [SYSTEM_PROMPT, ANSWER_FORMAT, KNOWLEDGE_DOMAIN_RESTRICTIONS].concat()
}

/// Build `(system_prompt, user_message)` for a domain chat request.
pub fn build_chat_prompt(request: &DomainChatRequest) -> (String, String) {
    let fields = RecordFields::from_request(request);
    let mut user_message = fields.user_input();

    if let Some(topic) = select_topic(request.question.as_str()) {
        user_message.push_str("\n\n");
        user_message.push_str(&fields.specialized(topic));
    }

    (chat_system_prompt(), user_message)
}

/// Full message sequence sent upstream for a domain chat request.
///
/// System prompt first, then the surviving prior turns in their original order,
/// then the newly built user message.
pub fn build_chat_messages(request: &DomainChatRequest) -> Vec<Message> {
    let (system_prompt, user_message) = build_chat_prompt(request);
    let history = request.previous_conversations.as_deref().unwrap_or_default();

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system_prompt));
    messages.extend(history.iter().filter_map(|turn| turn.to_message()));
    messages.push(Message::user(user_message));
    messages
}

/// Build `(system_prompt, user_message)` for a recommendation request.
pub fn build_recommendation_prompt(request: &RecommendationRequest) -> (String, String) {
    let patient = &request.patient_info;
    let user_message = format!(
        "\n请根据以下患者信息给出用药和治疗建议：\n\
         - 诊断: {} ({})\n\
         - 检查结果: {}\n\
         - 患者信息: 姓名 {}，性别 {}，年龄 {}\n\n\
         请只返回符合要求的 JSON 对象。\n",
        request.disease_name,
        request.disease_category,
        request.result,
        patient.name,
        patient.sex,
        patient.age,
    );
    (RECOMMENDATION_SYSTEM_PROMPT.to_string(), user_message)
}

pub fn build_recommendation_messages(request: &RecommendationRequest) -> Vec<Message> {
    let (system_prompt, user_message) = build_recommendation_prompt(request);
    vec![Message::system(system_prompt), Message::user(user_message)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{PatientInfo, PriorTurn, Role, TreatmentPlanInput};
    use pretty_assertions::assert_eq;

    fn chat_request(question: &str) -> DomainChatRequest {
        DomainChatRequest {
            disease_name: "糖尿病视网膜病变".to_string(),
            disease_category: "视网膜疾病".to_string(),
            result: "轻度糖尿病视网膜病变".to_string(),
            remark: None,
            treatment_plan: None,
            medications: None,
            previous_conversations: None,
            question: question.to_string(),
            model: None,
            temperature: None,
            max_tokens: None,
            stream: None,
        }
    }

    #[test]
    fn test_select_topic_medication_question() {
        assert_eq!(
            select_topic("这个药有什么副作用？"),
            Some(PromptTopic::Medication)
        );
    }

    #[test]
    fn test_select_topic_priority_order() {
        // Matches both disease explanation ("病因") and medication ("药").
        assert_eq!(
            select_topic("病因是什么，要吃药吗"),
            Some(PromptTopic::DiseaseExplanation)
        );
        assert_eq!(
            select_topic("需要手术还是用药"),
            Some(PromptTopic::TreatmentPlan)
        );
    }

    #[test]
    fn test_select_topic_other_topics() {
        assert_eq!(select_topic("平时饮食要注意什么"), Some(PromptTopic::PreventionLifestyle));
        assert_eq!(select_topic("会影响视力吗"), Some(PromptTopic::SeverityPrognosis));
        assert_eq!(select_topic("hello"), None);
        assert_eq!(select_topic(""), None);
    }

    #[test]
    fn test_format_medications() {
        assert_eq!(format_medications(&[]), "无");

        let meds = vec![
            MedicationInput {
                medication_name: Some("人工泪液".to_string()),
                dosage: Some("每次1-2滴".to_string()),
                frequency: Some("每天4次".to_string()),
                side_effects: None,
            },
            MedicationInput {
                medication_name: None,
                dosage: None,
                frequency: None,
                side_effects: Some("眼部刺激".to_string()),
            },
        ];
        assert_eq!(
            format_medications(&meds),
            "人工泪液，剂量：每次1-2滴，频率：每天4次；未知药物，可能的副作用：眼部刺激"
        );
    }

    #[test]
    fn test_build_chat_prompt_without_specialization() {
        let (system, user) = build_chat_prompt(&chat_request("请帮我看看"));
        assert!(system.starts_with(SYSTEM_PROMPT));
        assert!(system.contains("参考资料"));
        assert!(system.ends_with(KNOWLEDGE_DOMAIN_RESTRICTIONS));

        assert!(user.contains("- 诊断: 糖尿病视网膜病变 (视网膜疾病)"));
        assert!(user.contains("- 备注: 无备注"));
        assert!(user.contains("- 治疗计划: 无治疗计划"));
        assert!(user.contains("- 用药信息: 无"));
        assert!(user.ends_with("您的问题是: 请帮我看看\n"));
    }

    #[test]
    fn test_build_chat_prompt_appends_specialized_block() {
        let mut request = chat_request("这个药有什么副作用？");
        request.treatment_plan = Some(TreatmentPlanInput {
            treatment_type: None,
            treatment_detail: Some("每天使用人工泪液".to_string()),
        });
        request.medications = Some(vec![MedicationInput {
            medication_name: Some("人工泪液".to_string()),
            ..Default::default()
        }]);

        let (_, user) = build_chat_prompt(&request);
        assert!(user.contains("- 治疗计划: 每天使用人工泪液"));
        let (base, specialized) = user.split_once("\n\n\n\n").unwrap();
        assert!(base.ends_with("您的问题是: 这个药有什么副作用？"));
        assert!(specialized.starts_with("针对患者使用的药物（人工泪液）"));
        assert!(!user.contains("简明的疾病定义"));
    }

    #[test]
    fn test_build_chat_messages_orders_history() {
        let mut request = chat_request("会好吗");
        request.previous_conversations = Some(vec![
            PriorTurn {
                role: Some("user".to_string()),
                content: Some("第一问".to_string()),
            },
            PriorTurn {
                role: Some("system".to_string()),
                content: Some("ignored".to_string()),
            },
            PriorTurn {
                role: Some("assistant".to_string()),
                content: Some("   ".to_string()),
            },
            PriorTurn {
                role: Some("assistant".to_string()),
                content: Some("第一答".to_string()),
            },
            PriorTurn {
                role: None,
                content: Some("no role".to_string()),
            },
        ]);

        let messages = build_chat_messages(&request);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages[1].content, "第一问");
        assert_eq!(messages[2].content, "第一答");
        assert!(messages[3].content.contains("您的问题是: 会好吗"));
        assert!(messages[3].content.contains("严重性和预后"));
    }

    #[test]
    fn test_build_recommendation_prompt() {
        let request = RecommendationRequest {
            disease_name: "干眼症".to_string(),
            disease_category: "眼表疾病".to_string(),
            result: "泪膜破裂时间缩短".to_string(),
            patient_info: PatientInfo {
                name: "张三".to_string(),
                sex: "男".to_string(),
                age: 21,
            },
            model: None,
            temperature: None,
            max_tokens: None,
            stream: None,
        };

        let (system, user) = build_recommendation_prompt(&request);
        assert!(system.contains("\"treatment_plan\""));
        assert!(user.contains("- 诊断: 干眼症 (眼表疾病)"));
        assert!(user.contains("姓名 张三，性别 男，年龄 21"));

        let messages = build_recommendation_messages(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
    }
}
