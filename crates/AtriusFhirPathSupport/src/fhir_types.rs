//! # FHIR Type Catalog
//!
//! The FHIR core type hierarchy as a [`TypeRegistry`] extension: resources,
//! complex data types and primitive data types with their base types.

use once_cell::sync::Lazy;

use crate::type_info::{FHIR_NAMESPACE, TypeInfo, TypeRegistry};

/// Resources that derive directly from `Resource` rather than `DomainResource`.
const PLAIN_RESOURCES: [&str; 3] = ["Binary", "Bundle", "Parameters"];

const DOMAIN_RESOURCES: &[&str] = &[
    "Account", "ActivityDefinition", "AdverseEvent", "AllergyIntolerance", "Appointment",
    "AppointmentResponse", "AuditEvent", "Basic", "BiologicallyDerivedProduct", "BodyStructure",
    "CapabilityStatement", "CarePlan", "CareTeam", "CatalogEntry", "ChargeItem",
    "ChargeItemDefinition", "Claim", "ClaimResponse", "ClinicalImpression", "CodeSystem",
    "Communication", "CommunicationRequest", "CompartmentDefinition", "Composition", "ConceptMap",
    "Condition", "Consent", "Contract", "Coverage", "CoverageEligibilityRequest",
    "CoverageEligibilityResponse", "DetectedIssue", "Device", "DeviceDefinition", "DeviceMetric",
    "DeviceRequest", "DeviceUseStatement", "DiagnosticReport", "DocumentManifest",
    "DocumentReference", "EffectEvidenceSynthesis", "Encounter", "Endpoint", "EnrollmentRequest",
    "EnrollmentResponse", "EpisodeOfCare", "EventDefinition", "Evidence", "EvidenceVariable",
    "ExampleScenario", "ExplanationOfBenefit", "FamilyMemberHistory", "Flag", "Goal",
    "GraphDefinition", "Group", "GuidanceResponse", "HealthcareService", "ImagingStudy",
    "Immunization", "ImmunizationEvaluation", "ImmunizationRecommendation", "ImplementationGuide",
    "InsurancePlan", "Invoice", "Library", "Linkage", "List", "Location", "Measure", "MeasureReport",
    "Media", "Medication", "MedicationAdministration", "MedicationDispense", "MedicationKnowledge",
    "MedicationRequest", "MedicationStatement", "MedicinalProduct", "MessageDefinition",
    "MessageHeader", "MolecularSequence", "NamingSystem", "NutritionOrder", "Observation",
    "ObservationDefinition", "OperationDefinition", "OperationOutcome", "Organization",
    "OrganizationAffiliation", "Patient", "PaymentNotice", "PaymentReconciliation", "Person",
    "PlanDefinition", "Practitioner", "PractitionerRole", "Procedure", "Provenance",
    "Questionnaire", "QuestionnaireResponse", "RelatedPerson", "RequestGroup", "ResearchDefinition",
    "ResearchElementDefinition", "ResearchStudy", "ResearchSubject", "RiskAssessment",
    "RiskEvidenceSynthesis", "Schedule", "SearchParameter", "ServiceRequest", "Slot", "Specimen",
    "SpecimenDefinition", "StructureDefinition", "StructureMap", "Subscription", "Substance",
    "SupplyDelivery", "SupplyRequest", "Task", "TerminologyCapabilities", "TestReport", "TestScript",
    "ValueSet", "VerificationResult", "VisionPrescription",
];

/// Complex data types derived from `Element`.
const ELEMENT_TYPES: &[&str] = &[
    "Address", "Annotation", "Attachment", "BackboneElement", "CodeableConcept", "Coding",
    "ContactDetail", "ContactPoint", "Contributor", "DataRequirement", "Expression", "Extension",
    "HumanName", "Identifier", "Meta", "Money", "Narrative", "ParameterDefinition", "Period",
    "Quantity", "Range", "Ratio", "Reference", "RelatedArtifact", "SampledData", "Signature",
    "TriggerDefinition", "UsageContext",
];

/// Types derived from `BackboneElement`.
const BACKBONE_TYPES: &[&str] = &["Dosage", "ElementDefinition", "MarketingStatus", "Population", "Timing"];

/// Quantity profiles.
const QUANTITY_TYPES: &[&str] = &["Age", "Count", "Distance", "Duration", "MoneyQuantity", "SimpleQuantity"];

/// Primitive data types and their FHIR base.
const PRIMITIVE_TYPES: &[(&str, &str)] = &[
    ("boolean", "Element"),
    ("string", "Element"),
    ("integer", "Element"),
    ("integer64", "Element"),
    ("decimal", "Element"),
    ("date", "Element"),
    ("dateTime", "Element"),
    ("time", "Element"),
    ("instant", "Element"),
    ("uri", "Element"),
    ("base64Binary", "Element"),
    ("code", "string"),
    ("id", "string"),
    ("markdown", "string"),
    ("positiveInt", "integer"),
    ("unsignedInt", "integer"),
    ("url", "uri"),
    ("canonical", "uri"),
    ("oid", "uri"),
    ("uuid", "uri"),
    ("xhtml", "Element"),
];

fn qualified(name: &str) -> String {
    format!("{}.{}", FHIR_NAMESPACE, name)
}

static FHIR_TYPES: Lazy<TypeRegistry> = Lazy::new(|| {
    let mut registry = TypeRegistry::system();
    let base_any = "System.Any";
    registry.insert(TypeInfo::class(FHIR_NAMESPACE, "Resource", Some(base_any), vec![]));
    registry.insert(TypeInfo::class(FHIR_NAMESPACE, "Element", Some(base_any), vec![]));
    registry.insert(TypeInfo::class(
        FHIR_NAMESPACE,
        "DomainResource",
        Some(&qualified("Resource")),
        vec![],
    ));
    for name in PLAIN_RESOURCES {
        registry.insert(TypeInfo::class(FHIR_NAMESPACE, name, Some(&qualified("Resource")), vec![]));
    }
    for name in DOMAIN_RESOURCES {
        registry.insert(TypeInfo::class(
            FHIR_NAMESPACE,
            name,
            Some(&qualified("DomainResource")),
            vec![],
        ));
    }
    for name in ELEMENT_TYPES {
        registry.insert(TypeInfo::class(FHIR_NAMESPACE, name, Some(&qualified("Element")), vec![]));
    }
    for name in BACKBONE_TYPES {
        registry.insert(TypeInfo::class(
            FHIR_NAMESPACE,
            name,
            Some(&qualified("BackboneElement")),
            vec![],
        ));
    }
    for name in QUANTITY_TYPES {
        registry.insert(TypeInfo::class(FHIR_NAMESPACE, name, Some(&qualified("Quantity")), vec![]));
    }
    for (name, base) in PRIMITIVE_TYPES {
        registry.insert(TypeInfo::simple(FHIR_NAMESPACE, name, Some(&qualified(base))));
    }
    registry
});

impl TypeRegistry {
    /// System types plus the FHIR core catalog.
    pub fn fhir() -> Self {
        FHIR_TYPES.clone()
    }
}

/// Whether `name` is a resource type in the FHIR catalog.
pub fn is_resource_type(name: &str) -> bool {
    name == "Resource"
        || name == "DomainResource"
        || PLAIN_RESOURCES.contains(&name)
        || DOMAIN_RESOURCES.contains(&name)
}

/// Type info for a resource instance, falling back to a `DomainResource`
/// base for resource names the catalog does not list.
pub fn resource_type_info(resource_type: &str) -> TypeInfo {
    match FHIR_TYPES.get(&qualified(resource_type)) {
        Some(info) => info.clone(),
        None => TypeInfo::class(
            FHIR_NAMESPACE,
            resource_type,
            Some(&qualified("DomainResource")),
            vec![],
        ),
    }
}

/// Catalog entry for a FHIR data type or resource name such as `HumanName`
/// or `boolean`.
pub fn fhir_type_info(name: &str) -> Option<TypeInfo> {
    FHIR_TYPES.get(&qualified(name)).cloned()
}
