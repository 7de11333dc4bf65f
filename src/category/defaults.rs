//! Built-in category dictionary

const DEFAULT_LABELS: &[&str] = &[
    "йога",
    "велопокатушка",
    "музыка",
    "калимба",
    "гитара",
    "балалайка",
    "пение",
    "банджо",
    "пианино",
    "вистл",
    "блокфлейта",
    "скрипка",
    "гиджак",
    "мандолина",
    "бузуки",
    "бас",
    "уд",
    "уд155",
    "гусли",
    "укулеле",
    "занятие гитарой",
    "занятие скрипкой",
    "занятие виолончелью",
    "занятие пением",
    "занятие флейтой",
    "занятие арфой",
    "занятие басом",
    "занятие теорией музыки",
    "быт",
    "побрился",
    "помылся",
    "уборка",
    "ремонт",
    "утро",
    "утренние процедуры",
    "вечерние процедуры",
    "к выходу готов",
    "медицина",
    "болел",
    "спал",
    "программирование",
    "электроника",
    "config",
    "анализ данных",
    "английский",
    "занятие английским",
    "худ",
    "аниме",
    "манга",
    "фильм",
    "сериал",
    "думал",
    "прогулка",
    "гамак",
    "работа",
    "приехал на работу",
    "приехал с работы",
    "занятие вождением",
    "вождение",
    "кожа",
    "шитьё",
    "велосипед",
    "мастерил",
    "моделирование",
    "авиамоделизм",
    "carving",
    "знание",
    "tracker",
    "рисование",
    "токарка",
    "поездка в Ташкент",
    "поездка в Грузию",
    "пилатес",
    "бокс",
    "бег",
    "скалодром",
    "функциональный тренинг",
    "миофасциальный релиз",
    "подвесной тренинг",
    "мотопокатушка",
    "стретчинг",
    "бассейн",
    "лыжи",
    "ледовые коньки",
    "роликовые коньки",
    "батуты",
    "картинг",
];

/// Labels used when the configuration does not provide its own list
pub fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|l| l.to_string()).collect()
}
